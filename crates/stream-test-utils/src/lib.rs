//! # Stream Test Utilities
//!
//! Shared test utilities for the stream service.
//!
//! This crate provides:
//! - Server test harness (`TestStreamServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_service::pipeline::mock::{MockLauncher, RetrievalScript};
//! use stream_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let launcher = MockLauncher::new(RetrievalScript::chunks(vec![b"abc".to_vec()], 0));
//!     let server = TestStreamServer::spawn(Arc::new(launcher)).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
