//! Stream Service
//!
//! Entry point for the adaptive-bitrate audio streaming proxy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stream_service::config::{Config, LogFormat};
use stream_service::observability::metrics::init_metrics_recorder;
use stream_service::pipeline::ProcessLauncher;
use stream_service::routes::{self, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DRAIN_SECONDS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it decides the log format.
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.log_format);

    info!("Starting Stream Service");
    info!(
        bind_address = %config.bind_address,
        retriever_bin = %config.retriever_bin,
        transcoder_bin = %config.transcoder_bin,
        startup_timeout_seconds = config.retrieval_startup_timeout_seconds,
        monitor_interval_seconds = config.monitor_interval_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        std::io::Error::other(e)
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let launcher = Arc::new(ProcessLauncher::from_config(&config));
    let state = Arc::new(AppState::new(config, launcher));
    let app = routes::build_routes(Arc::clone(&state), metrics_handle);

    info!("Stream Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
    .await?;

    info!("Stream Service shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stream_service=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for SIGINT/SIGTERM, stops every live session, then drains.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    state.begin_draining();
    let stopped = state.registry.stop_all().await;
    info!(sessions = stopped, "Stopped live sessions");

    let drain_secs: u64 = std::env::var("STREAM_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DRAIN_SECONDS);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (STREAM_DRAIN_SECONDS=0)");
    }
}
