//! Request and response types for the HTTP surface.

use crate::quality::{QualityProfile, Tier};
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters of `GET /stream`.
///
/// Everything arrives as text so malformed values produce a structured 400
/// instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub query: Option<String>,
    /// Seek offset in seconds.
    pub t: Option<String>,
    pub quality: Option<String>,
}

/// Query parameters of `GET /connection-info`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionInfoParams {
    pub session: Option<String>,
    pub quality: Option<String>,
}

/// Query parameters of `GET /duration`.
#[derive(Debug, Default, Deserialize)]
pub struct DurationParams {
    pub query: Option<String>,
}

/// One tier as advertised by `/connection-info`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub tier: Tier,
    pub bitrate_kbps: u32,
    pub container: &'static str,
    pub content_type: &'static str,
    pub codec: &'static str,
    pub channels: u8,
    pub sample_rate: u32,
}

impl From<&QualityProfile> for ProfileInfo {
    fn from(profile: &QualityProfile) -> Self {
        Self {
            tier: profile.tier,
            bitrate_kbps: profile.bitrate_kbps,
            container: profile.container.format_name(),
            content_type: profile.container.content_type(),
            codec: profile.codec,
            channels: profile.channels,
            sample_rate: profile.sample_rate,
        }
    }
}

/// Classification threshold: effective speeds below `below_kbps` map to
/// `tier`.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdInfo {
    pub below_kbps: f64,
    pub tier: Tier,
}

/// Response of `GET /connection-info`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfoResponse {
    pub tiers: Vec<ProfileInfo>,
    pub default_tier: Tier,
    pub default_request_tier: Tier,
    pub buffer_factor: f64,
    pub thresholds: Vec<ThresholdInfo>,

    /// Rendition ladder up to the requested tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder: Option<Vec<Tier>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSnapshot>,
}

/// Response of `DELETE /session/:session_id`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStoppedResponse {
    pub success: bool,
    pub message: &'static str,
    pub session_id: Uuid,
}

/// Response of `GET /duration`. Milliseconds; 0 when unknown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationResponse {
    pub duration: u64,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    pub active_sessions: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
