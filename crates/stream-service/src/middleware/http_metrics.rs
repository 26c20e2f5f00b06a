//! HTTP metrics middleware.
//!
//! Records every response, including framework-level rejections that never
//! reach a handler (404, 405).

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized path, status and time to response headers.
///
/// For streaming responses the recorded duration ends when headers are
/// produced; the body is accounted for by the session metrics.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
