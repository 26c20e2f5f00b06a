//! Metrics definitions for the stream service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `stream_` prefix
//! - `_total` suffix for counters
//! - `_seconds` / `_kbps` / `_bytes` suffixes naming the unit
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the fixed route set plus `/other`
//! - `status`: success, error, timeout
//! - `outcome`: stopped, failed
//! - `tier`: the five quality tiers
//! - `error_type`: bounded by `StreamError` variants

use crate::quality::Tier;
use crate::session::SessionStatus;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` endpoint.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("stream_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Throughput buckets bracket the tier thresholds (effective = 1.5x)
        .set_buckets_for_metric(
            Matcher::Full("stream_measured_throughput_kbps".to_string()),
            &[25.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0],
        )
        .map_err(|e| format!("Failed to set throughput buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("stream_session_duration_seconds".to_string()),
            &[1.0, 5.0, 15.0, 30.0, 60.0, 180.0, 300.0, 600.0, 1800.0, 3600.0],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `stream_http_requests_total`, `stream_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// For `/stream` the duration covers time to headers, not the whole body.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("stream_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("stream_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Replaces the session id in `/session/{id}` and folds unknown paths into
/// `/other`.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/stream" | "/connection-info" | "/duration" | "/health" | "/ready" | "/metrics" => {
            path.to_string()
        }
        _ if path.starts_with("/session/") && path.matches('/').count() == 2 => {
            "/session/{id}".to_string()
        }
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Metric: `stream_active_sessions`
pub fn set_active_sessions(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("stream_active_sessions").set(count as f64);
}

/// Metric: `stream_sessions_started_total`
/// Labels: `tier` (negotiated tier)
pub fn record_session_started(tier: Tier) {
    counter!("stream_sessions_started_total", "tier" => tier.as_str()).increment(1);
}

/// Record how a session ended.
///
/// Metric: `stream_sessions_total`, `stream_session_duration_seconds`
/// Labels: `outcome`
pub fn record_session_outcome(status: SessionStatus, duration: Duration) {
    counter!("stream_sessions_total", "outcome" => status.as_str()).increment(1);
    histogram!("stream_session_duration_seconds", "outcome" => status.as_str())
        .record(duration.as_secs_f64());
}

/// Metric: `stream_bytes_streamed_total`
pub fn record_bytes_streamed(bytes: u64) {
    counter!("stream_bytes_streamed_total").increment(bytes);
}

/// Metric: `stream_measured_throughput_kbps`
pub fn record_throughput(kbps: f64) {
    histogram!("stream_measured_throughput_kbps").record(kbps);
}

/// Record a committed quality recommendation.
///
/// Metric: `stream_quality_recommendations_total`
/// Labels: `tier`
pub fn record_quality_recommendation(tier: Tier) {
    counter!("stream_quality_recommendations_total", "tier" => tier.as_str()).increment(1);
}

/// Metric: `stream_pipeline_errors_total`
/// Labels: `error_type`
pub fn record_pipeline_error(error_type: &'static str) {
    counter!("stream_pipeline_errors_total", "error_type" => error_type).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise the recording paths without a recorder
    // installed; the macros are no-ops in that case.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/stream", 200, Duration::from_millis(120));
        record_http_request("GET", "/connection-info", 404, Duration::from_millis(2));
        record_http_request(
            "DELETE",
            "/session/6f1c1f0e-8a53-4b8e-9d7e-0f4a3c2b1a00",
            200,
            Duration::from_millis(3),
        );
        record_http_request("GET", "/stream", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(503), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/stream"), "/stream");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/duration"), "/duration");
        assert_eq!(normalize_endpoint("/connection-info"), "/connection-info");
    }

    #[test]
    fn test_normalize_endpoint_session_paths() {
        assert_eq!(normalize_endpoint("/session/abc"), "/session/{id}");
        assert_eq!(normalize_endpoint("/session/abc/extra"), "/other");
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/"), "/other");
        assert_eq!(normalize_endpoint("/music/stream"), "/other");
    }

    #[test]
    fn test_session_and_pipeline_recorders() {
        set_active_sessions(3);
        record_session_started(Tier::High);
        record_session_outcome(SessionStatus::Stopped, Duration::from_secs(42));
        record_session_outcome(SessionStatus::Failed, Duration::from_secs(1));
        record_bytes_streamed(4096);
        record_throughput(320.5);
        record_quality_recommendation(Tier::Low);
        record_pipeline_error("retrieval_exit");
    }
}
