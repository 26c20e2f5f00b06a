//! `GET /duration?query=<text>`: media duration in milliseconds.
//!
//! Lookup failures are not errors for the client: the response is
//! `{"duration": 0}` and the cause is logged.

use crate::errors::StreamError;
use crate::handlers::stream::require_query;
use crate::models::{DurationParams, DurationResponse};
use crate::pipeline::commands::media_reference;
use crate::pipeline::progress::parse_duration_ms;
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[instrument(skip_all, name = "stream.handler.duration")]
pub async fn get_duration(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DurationParams>,
) -> Result<Json<DurationResponse>, StreamError> {
    let query = require_query(params.query.as_deref())?;
    let reference = media_reference(&query, &state.config.retriever_search_prefix);
    let limit = state.config.duration_lookup_timeout();

    let probe = tokio::time::timeout(limit, state.launcher.probe_duration(&reference)).await;

    let duration = match probe {
        Ok(Ok(text)) => match parse_duration_ms(&text) {
            Ok(ms) => {
                debug!(target: "stream.handler", duration_ms = ms, "Duration resolved");
                ms
            }
            Err(e) => {
                warn!(target: "stream.handler", error = %e, "Unparseable duration output");
                0
            }
        },
        Ok(Err(e)) => {
            warn!(target: "stream.handler", error = %e, "Duration lookup failed");
            0
        }
        Err(_) => {
            warn!(
                target: "stream.handler",
                timeout_seconds = limit.as_secs(),
                "Duration lookup timed out"
            );
            0
        }
    };

    Ok(Json(DurationResponse { duration }))
}
