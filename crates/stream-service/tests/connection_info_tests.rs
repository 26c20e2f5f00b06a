//! `/connection-info` integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use stream_service::pipeline::mock::{MockLauncher, RetrievalScript};
use stream_test_utils::TestStreamServer;
use uuid::Uuid;

async fn get_json(url: String) -> Result<(u16, serde_json::Value), anyhow::Error> {
    let response = reqwest::get(url).await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

fn silent_server_launcher() -> Arc<MockLauncher> {
    Arc::new(MockLauncher::new(RetrievalScript::Silent))
}

#[tokio::test]
async fn test_lists_tiers_and_thresholds() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(silent_server_launcher()).await?;

    let (status, body) = get_json(format!("{}/connection-info", server.url())).await?;
    assert_eq!(status, 200);

    let tiers = body["tiers"].as_array().unwrap();
    let names: Vec<&str> = tiers.iter().map(|t| t["tier"].as_str().unwrap()).collect();
    assert_eq!(names, ["ultra-low", "low", "medium", "high", "ultra-high"]);
    let bitrates: Vec<u64> = tiers
        .iter()
        .map(|t| t["bitrate_kbps"].as_u64().unwrap())
        .collect();
    assert_eq!(bitrates, [32, 64, 128, 192, 256]);
    assert_eq!(tiers[0]["content_type"], "audio/mpeg");
    assert_eq!(tiers[0]["sample_rate"], 44_100);
    assert_eq!(tiers[0]["channels"], 2);

    assert_eq!(body["default_tier"], "medium");
    assert_eq!(body["default_request_tier"], "ultra-high");
    assert_eq!(body["buffer_factor"], 1.5);

    let thresholds = body["thresholds"].as_array().unwrap();
    assert_eq!(thresholds.len(), 4);
    assert_eq!(thresholds[0]["below_kbps"], 75.0);
    assert_eq!(thresholds[0]["tier"], "ultra-low");
    assert_eq!(thresholds[3]["below_kbps"], 600.0);
    assert_eq!(thresholds[3]["tier"], "high");

    assert!(body.get("ladder").is_none());
    assert!(body.get("session").is_none());
    Ok(())
}

#[tokio::test]
async fn test_ladder_for_requested_quality() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(silent_server_launcher()).await?;

    let (status, body) =
        get_json(format!("{}/connection-info?quality=medium", server.url())).await?;
    assert_eq!(status, 200);
    assert_eq!(body["ladder"], serde_json::json!(["ultra-low", "low", "medium"]));

    let (status, body) =
        get_json(format!("{}/connection-info?quality=best", server.url())).await?;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_unknown_or_malformed_session() -> Result<(), anyhow::Error> {
    let server = TestStreamServer::spawn(silent_server_launcher()).await?;

    let (status, body) = get_json(format!(
        "{}/connection-info?session={}",
        server.url(),
        Uuid::new_v4()
    ))
    .await?;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) =
        get_json(format!("{}/connection-info?session=abc", server.url())).await?;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_includes_live_session_snapshot() -> Result<(), anyhow::Error> {
    let launcher = Arc::new(MockLauncher::new(RetrievalScript::held_open(vec![
        vec![3; 1024],
    ])));
    let server = TestStreamServer::spawn(launcher).await?;

    let mut stream =
        reqwest::get(format!("{}/stream?query=song&quality=high", server.url())).await?;
    assert_eq!(stream.status(), 200);
    let session_id = stream.headers()["x-session-id"].to_str()?.to_string();
    let _ = stream.chunk().await?;

    let (status, body) = get_json(format!(
        "{}/connection-info?session={}",
        server.url(),
        session_id
    ))
    .await?;
    assert_eq!(status, 200);

    let session = &body["session"];
    assert_eq!(session["session_id"], session_id);
    assert_eq!(session["query"], "song");
    assert_eq!(session["status"], "streaming");
    assert_eq!(session["negotiated_tier"], "high");
    assert_eq!(session["active_tier"], "high");
    assert_eq!(session["negotiated_bitrate_kbps"], 192);
    assert_eq!(session["monitor_active"], true);
    assert!(session["analyzer"]["last_5_samples"].is_array());

    drop(stream);
    Ok(())
}
