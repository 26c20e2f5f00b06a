//! HTTP handlers for the stream service.

pub mod connection_info;
pub mod duration;
pub mod health;
pub mod metrics;
pub mod sessions;
pub mod stream;

pub use connection_info::connection_info;
pub use duration::get_duration;
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use sessions::stop_session;
pub use stream::stream_audio;
