//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - not ready once shutdown has begun

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler. Checks nothing beyond the process answering.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 with the live session count, or 503 while the service is
/// draining for shutdown.
#[tracing::instrument(skip_all, name = "stream.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_sessions = state.registry.len().await;

    if state.is_draining() {
        tracing::warn!(
            target: "stream.handler",
            active_sessions,
            "Readiness check failed: service is draining"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                active_sessions,
                error: Some("Service is shutting down".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            active_sessions,
            error: None,
        }),
    )
}
