//! Stream service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Pipeline
//! failures return a generic message to the client; the underlying detail is
//! logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stream service error type.
///
/// Maps to HTTP status codes:
/// - RetrievalLaunch, RetrievalExit, Transcode, StreamWrite, Internal: 500
/// - BadRequest: 400
/// - NotFound: 404
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Retrieval launch failed: {0}")]
    RetrievalLaunch(String),

    #[error("Retrieval exited with {}: {reason}", exit_code_display(.code))]
    RetrievalExit { code: Option<i32>, reason: String },

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Stream write failed: {0}")]
    StreamWrite(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code".to_string(),
    }
}

impl StreamError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            StreamError::BadRequest(_) => 400,
            StreamError::NotFound(_) => 404,
            StreamError::RetrievalLaunch(_)
            | StreamError::RetrievalExit { .. }
            | StreamError::Transcode(_)
            | StreamError::StreamWrite(_)
            | StreamError::Internal(_) => 500,
        }
    }

    /// Machine-readable error code used in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::RetrievalLaunch(_) => "RETRIEVAL_LAUNCH_ERROR",
            StreamError::RetrievalExit { .. } => "RETRIEVAL_EXIT_ERROR",
            StreamError::Transcode(_) => "TRANSCODE_ERROR",
            StreamError::StreamWrite(_) => "STREAM_WRITE_ERROR",
            StreamError::BadRequest(_) => "BAD_REQUEST",
            StreamError::NotFound(_) => "NOT_FOUND",
            StreamError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short label for the pipeline error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::RetrievalLaunch(_) => "retrieval_launch",
            StreamError::RetrievalExit { .. } => "retrieval_exit",
            StreamError::Transcode(_) => "transcode",
            StreamError::StreamWrite(_) => "stream_write",
            StreamError::BadRequest(_) => "bad_request",
            StreamError::NotFound(_) => "not_found",
            StreamError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            StreamError::RetrievalLaunch(err) => {
                tracing::error!(target: "stream.pipeline", error = %err, "Retrieval stage failed to launch");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to start media retrieval".to_string(),
                )
            }
            StreamError::RetrievalExit { code, reason } => {
                tracing::error!(
                    target: "stream.pipeline",
                    exit_code = ?code,
                    reason = %reason,
                    "Retrieval stage exited before producing audio"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Media retrieval failed".to_string(),
                )
            }
            StreamError::Transcode(err) => {
                tracing::error!(target: "stream.pipeline", error = %err, "Transcode stage failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Audio transcoding failed".to_string(),
                )
            }
            StreamError::StreamWrite(err) => {
                tracing::error!(target: "stream.pipeline", error = %err, "Response write failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Stream delivery failed".to_string(),
                )
            }
            StreamError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            StreamError::NotFound(resource) => (StatusCode::NOT_FOUND, resource.clone()),
            StreamError::Internal(err) => {
                tracing::error!(target: "stream.internal", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_retrieval_exit_with_code() {
        let error = StreamError::RetrievalExit {
            code: Some(1),
            reason: "no audio produced".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Retrieval exited with code 1: no audio produced"
        );
    }

    #[test]
    fn test_display_retrieval_exit_without_code() {
        let error = StreamError::RetrievalExit {
            code: None,
            reason: "killed".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Retrieval exited with no exit code: killed"
        );
    }

    #[test]
    fn test_display_transcode() {
        let error = StreamError::Transcode("exit 183".to_string());
        assert_eq!(format!("{}", error), "Transcode failed: exit 183");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StreamError::RetrievalLaunch("x".into()).status_code(), 500);
        assert_eq!(
            StreamError::RetrievalExit {
                code: Some(2),
                reason: "x".into()
            }
            .status_code(),
            500
        );
        assert_eq!(StreamError::Transcode("x".into()).status_code(), 500);
        assert_eq!(StreamError::StreamWrite("x".into()).status_code(), 500);
        assert_eq!(StreamError::Internal("x".into()).status_code(), 500);
        assert_eq!(StreamError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(StreamError::NotFound("x".into()).status_code(), 404);
    }

    #[tokio::test]
    async fn test_into_response_retrieval_exit_is_generic() {
        let error = StreamError::RetrievalExit {
            code: Some(1),
            reason: "ERROR: [youtube] private video".to_string(),
        };
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "RETRIEVAL_EXIT_ERROR");
        assert_eq!(body_json["error"]["message"], "Media retrieval failed");
    }

    #[tokio::test]
    async fn test_into_response_retrieval_launch() {
        let response = StreamError::RetrievalLaunch("No such file".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "RETRIEVAL_LAUNCH_ERROR");
        assert_eq!(
            body_json["error"]["message"],
            "Failed to start media retrieval"
        );
    }

    #[tokio::test]
    async fn test_into_response_transcode() {
        let response = StreamError::Transcode("spawn failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "TRANSCODE_ERROR");
    }

    #[tokio::test]
    async fn test_into_response_stream_write() {
        let response = StreamError::StreamWrite("channel closed".to_string()).into_response();
        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "STREAM_WRITE_ERROR");
    }

    #[tokio::test]
    async fn test_into_response_bad_request_keeps_reason() {
        let response = StreamError::BadRequest("query is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "BAD_REQUEST");
        assert_eq!(body_json["error"]["message"], "query is required");
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = StreamError::NotFound("Session not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "NOT_FOUND");
        assert_eq!(body_json["error"]["message"], "Session not found");
    }

    #[tokio::test]
    async fn test_into_response_internal() {
        let response = StreamError::Internal("channel send failed".to_string()).into_response();
        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body_json["error"]["message"], "An internal error occurred");
    }
}
