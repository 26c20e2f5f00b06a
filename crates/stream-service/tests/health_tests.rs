//! Operational endpoint integration tests: `/health`, `/ready`, `/metrics`
//! and `/duration`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use stream_service::pipeline::mock::{MockLauncher, RetrievalScript};
use stream_test_utils::TestStreamServer;

fn launcher_with_duration(duration: Option<&str>) -> Arc<MockLauncher> {
    let launcher = MockLauncher::new(RetrievalScript::Silent);
    Arc::new(match duration {
        Some(text) => launcher.with_duration(text),
        None => launcher,
    })
}

/// `/health` returns plain text "OK" for liveness probes.
#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

#[tokio::test]
async fn test_ready_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["active_sessions"], 0);
    Ok(())
}

#[tokio::test]
async fn test_ready_endpoint_503_while_draining() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;
    server.state().begin_draining();

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_duration_in_milliseconds() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(Some("3:25\n"))).await?;

    let response = reqwest::get(format!("{}/duration?query=some%20song", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["duration"], 205_000);
    Ok(())
}

#[tokio::test]
async fn test_duration_zero_when_lookup_fails() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;

    let response = reqwest::get(format!("{}/duration?query=song", server.url())).await?;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["duration"], 0);
    Ok(())
}

#[tokio::test]
async fn test_duration_zero_when_output_malformed() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(Some("live"))).await?;

    let response = reqwest::get(format!("{}/duration?query=song", server.url())).await?;
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["duration"], 0);
    Ok(())
}

#[tokio::test]
async fn test_duration_requires_query() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(launcher_with_duration(None)).await?;

    let response = reqwest::get(format!("{}/duration", server.url())).await?;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}
