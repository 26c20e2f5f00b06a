//! HTTP routes for the stream service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::pipeline::PipelineLauncher;
use crate::quality::QualityProfileTable;
use crate::session::{SessionRegistry, SessionSettings};
use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Tier -> profile table, shared read-only by every session.
    pub profiles: Arc<QualityProfileTable>,

    /// Starts retrieval/transcode stages. Subprocesses in production, the
    /// in-memory pipeline in tests.
    pub launcher: Arc<dyn PipelineLauncher>,

    /// Live sessions.
    pub registry: Arc<SessionRegistry>,

    /// Set once shutdown begins; `/ready` reports not ready from then on.
    pub draining: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config, launcher: Arc<dyn PipelineLauncher>) -> Self {
        Self {
            config,
            profiles: Arc::new(QualityProfileTable::standard()),
            launcher,
            registry: Arc::new(SessionRegistry::new()),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from_config(&self.config)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn begin_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/stream` - adaptive audio stream
/// - `/connection-info` - tier table, thresholds, optional session snapshot
/// - `/session/:session_id` - stop a live session (DELETE)
/// - `/duration` - media duration lookup
/// - `/health`, `/ready` - liveness and readiness probes
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - timeout to response headers (`REQUEST_TIMEOUT_SECONDS`, longer than the
///   retrieval startup timeout)
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.request_timeout();

    let app_routes = Router::new()
        .route("/stream", get(handlers::stream_audio))
        .route("/connection-info", get(handlers::connection_info))
        .route("/session/:session_id", delete(handlers::stop_session))
        .route("/duration", get(handlers::get_duration))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - bounds time to headers, not the streamed body
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
