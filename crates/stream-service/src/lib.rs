//! Stream Service Library
//!
//! An adaptive-bitrate audio streaming proxy. Each request chains an
//! external retrieval stage into an external transcode stage and relays the
//! encoded audio to the client, while a per-session analyzer measures
//! delivered throughput and recommends a quality tier.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> session (actor) -> pipeline (stages)
//!                                        \-> quality (profiles, analyzer)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Request/response types
//! - `observability` - Prometheus metrics
//! - `pipeline` - Retrieval/transcode stage contract, subprocess and mock
//!   implementations
//! - `quality` - Profile table and connection analyzer
//! - `routes` - Axum router setup and application state
//! - `session` - Session actor, lifecycle states, registry

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod quality;
pub mod routes;
pub mod session;
