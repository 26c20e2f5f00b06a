//! `GET /connection-info`: what the service can serve and how it decides.

use crate::errors::StreamError;
use crate::handlers::stream::parse_tier;
use crate::models::{ConnectionInfoParams, ConnectionInfoResponse, ProfileInfo, ThresholdInfo};
use crate::quality::analyzer::{BUFFER_FACTOR, TIER_THRESHOLDS};
use crate::quality::{QualityProfileTable, Tier, DEFAULT_REQUEST_TIER};
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Lists tiers and classification thresholds.
///
/// `?session=<id>` adds that session's snapshot (404 when unknown).
/// `?quality=<tier>` adds the rendition ladder up to that tier.
#[instrument(skip_all, name = "stream.handler.connection_info")]
pub async fn connection_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectionInfoParams>,
) -> Result<Json<ConnectionInfoResponse>, StreamError> {
    let ladder = parse_tier(params.quality.as_deref())?.map(Tier::ladder_up_to);

    let session = match params.session.as_deref() {
        None => None,
        Some(raw) => {
            let session_id = Uuid::parse_str(raw.trim())
                .map_err(|_| StreamError::BadRequest(format!("Invalid session id '{raw}'")))?;
            let not_found = || StreamError::NotFound(format!("Session {session_id} not found"));
            let handle = state
                .registry
                .get(&session_id)
                .await
                .ok_or_else(not_found)?;
            // The session may end between lookup and snapshot.
            Some(handle.snapshot().await.map_err(|_| not_found())?)
        }
    };

    Ok(Json(ConnectionInfoResponse {
        tiers: state.profiles.iter().map(ProfileInfo::from).collect(),
        default_tier: QualityProfileTable::default_tier(),
        default_request_tier: DEFAULT_REQUEST_TIER,
        buffer_factor: BUFFER_FACTOR,
        thresholds: TIER_THRESHOLDS
            .iter()
            .map(|(below_kbps, tier)| ThresholdInfo {
                below_kbps: *below_kbps,
                tier: *tier,
            })
            .collect(),
        ladder,
        session,
    }))
}
