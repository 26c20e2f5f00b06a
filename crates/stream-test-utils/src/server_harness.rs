//! Test server harness for E2E testing
//!
//! Provides `TestStreamServer` for spawning real stream service instances
//! in tests, backed by any [`PipelineLauncher`] (usually the in-memory
//! mock pipeline).

use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use stream_service::config::Config;
use stream_service::pipeline::PipelineLauncher;
use stream_service::routes::{self, AppState};
use tokio::task::JoinHandle;

/// Test harness for spawning the stream service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_stream_e2e() -> Result<(), anyhow::Error> {
///     let launcher = MockLauncher::new(RetrievalScript::chunks(vec![vec![1; 64]], 0));
///     let server = TestStreamServer::spawn(Arc::new(launcher)).await?;
///
///     let response = reqwest::get(format!("{}/stream?query=test", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestStreamServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestStreamServer {
    /// Spawn a server with the default configuration.
    pub async fn spawn(launcher: Arc<dyn PipelineLauncher>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(launcher, HashMap::new()).await
    }

    /// Spawn a server with extra configuration variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        launcher: Arc<dyn PipelineLauncher>,
        extra_vars: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string())]);
        vars.extend(extra_vars);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::new(config.clone(), launcher));

        // The global recorder can only be installed once per process; later
        // servers get a standalone recorder.
        let metrics_handle = match routes::init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared application state, for inspecting the session registry.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestStreamServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
