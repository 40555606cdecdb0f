//! Action endpoints (/actions/validate, /actions/track)

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::models::{ClientInfo, RawAction};
use crate::services::error::ApiError;
use crate::services::recorder::LevelUp;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actions/validate", post(validate))
        .route("/actions/track", post(track))
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
}

/// POST /actions/validate - Check an action without recording it
async fn validate(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(action): Json<RawAction>,
) -> Result<Json<ValidateResponse>, ApiError> {
    state
        .recorder
        .validate_only(&action, &client, Utc::now())
        .await?;

    Ok(Json(ValidateResponse { valid: true }))
}

#[derive(Deserialize)]
struct TrackRequest {
    #[serde(flatten)]
    action: RawAction,
    /// Client's idea of the award, only ever used to lower it
    points: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    success: bool,
    xp_awarded: i64,
    #[serde(rename = "totalXP")]
    total_xp: i64,
    level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    level_up: Option<LevelUp>,
}

/// POST /actions/track - Validate and record an action
async fn track(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<TrackRequest>,
) -> Result<Json<TrackResponse>, ApiError> {
    let outcome = state
        .recorder
        .record_activity(&req.action, &client, req.points, Utc::now())
        .await?;

    Ok(Json(TrackResponse {
        success: true,
        xp_awarded: outcome.xp.total_xp,
        total_xp: outcome.user.total_xp,
        level: outcome.user.level,
        level_up: outcome.level_up,
    }))
}
