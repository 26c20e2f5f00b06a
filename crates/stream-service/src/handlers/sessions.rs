//! `DELETE /session/:session_id`: stop a live session.

use crate::errors::StreamError;
use crate::models::SessionStoppedResponse;
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Stops the session gracefully and waits for its cleanup. The client's
/// stream ends normally.
#[instrument(skip_all, name = "stream.handler.stop_session", fields(session_id = %session_id))]
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStoppedResponse>, StreamError> {
    let id = Uuid::parse_str(&session_id)
        .map_err(|_| StreamError::BadRequest(format!("Invalid session id '{session_id}'")))?;
    let not_found = || StreamError::NotFound(format!("Session {id} not found"));

    let handle = state.registry.get(&id).await.ok_or_else(not_found)?;
    handle.stop().await.map_err(|_| not_found())?;

    info!(target: "stream.handler", session_id = %id, "Session stopped on request");

    Ok(Json(SessionStoppedResponse {
        success: true,
        message: "Session stopped",
        session_id: id,
    }))
}
