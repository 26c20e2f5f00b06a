//! Streaming endpoint.
//!
//! `GET /stream?query=<text>&t=<seconds>&quality=<tier>` validates the
//! request, starts a session, and answers once the first audio byte has
//! arrived. Until then every failure is a JSON error; after the headers
//! have gone out, failures only end the body.

use crate::errors::StreamError;
use crate::models::StreamParams;
use crate::pipeline::commands::media_reference;
use crate::quality::{Tier, DEFAULT_REQUEST_TIER};
use crate::routes::AppState;
use crate::session::{SessionRequest, StreamSession};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use std::sync::Arc;
use tracing::{info, instrument};

pub const SESSION_ID_HEADER: &str = "x-session-id";

#[instrument(skip_all, name = "stream.handler.stream")]
pub async fn stream_audio(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Result<Response, StreamError> {
    let query = require_query(params.query.as_deref())?;
    let seek_offset = parse_seek(params.t.as_deref())?;
    let tier = parse_tier(params.quality.as_deref())?.unwrap_or(DEFAULT_REQUEST_TIER);

    let reference = media_reference(&query, &state.config.retriever_search_prefix);

    let mut session = StreamSession::new(
        SessionRequest {
            query,
            reference,
            tier,
        },
        Arc::clone(&state.profiles),
        Arc::clone(&state.launcher),
        state.session_settings(),
    );
    let session_id = session.id();

    info!(
        target: "stream.handler",
        session_id = %session_id,
        tier = %tier,
        seek_offset,
        "Stream requested"
    );

    let body = session.start(seek_offset).await?;
    let content_type = session.negotiated_profile().container.content_type();

    let (handle, task) = session.spawn();
    state.registry.track(handle, task).await;

    let session_header = HeaderValue::from_str(&session_id.to_string())
        .map_err(|e| StreamError::Internal(format!("invalid session id header: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::TRANSFER_ENCODING, "chunked")
        .header(SESSION_ID_HEADER, session_header)
        .body(Body::from_stream(body))
        .map_err(|e| StreamError::Internal(format!("failed to build stream response: {e}")))
}

/// Trimmed, non-blank query text.
pub(crate) fn require_query(query: Option<&str>) -> Result<String, StreamError> {
    match query.map(str::trim) {
        Some(q) if !q.is_empty() => Ok(q.to_string()),
        _ => Err(StreamError::BadRequest(
            "Query parameter 'query' is required".to_string(),
        )),
    }
}

/// Seek offset in seconds. Missing or empty means 0.
pub(crate) fn parse_seek(t: Option<&str>) -> Result<f64, StreamError> {
    let Some(raw) = t.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(0.0);
    };

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(StreamError::BadRequest(format!(
            "Invalid seek offset '{raw}': expected non-negative seconds"
        ))),
    }
}

/// Optional tier. Missing or empty means "use the default".
pub(crate) fn parse_tier(quality: Option<&str>) -> Result<Option<Tier>, StreamError> {
    match quality.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Tier>()
            .map(Some)
            .map_err(|e| StreamError::BadRequest(e.to_string())),
    }
}
