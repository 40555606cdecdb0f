//! Progress endpoints (/progress/*)
//!
//! `track-advanced` goes through the full recorder. The three bonus pings
//! fail open and sit behind the per-user token bucket instead.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::models::{ClientInfo, RawAction, UserState};
use crate::services::bonuses::{
    self, BonusGrant, CompletionBonusRequest, EngagementBonusRequest, WatchBonusRequest,
};
use crate::services::error::{ApiError, Rejection};
use crate::services::recorder::{LevelUp, UnlockedAchievement};
use crate::services::xp::XpAward;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/progress/track-advanced", post(track_advanced))
        .route("/progress/watch-bonus", post(watch_bonus))
        .route("/progress/video-complete", post(video_complete))
        .route("/progress/engagement-bonus", post(engagement_bonus))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackAdvancedResponse {
    success: bool,
    xp: XpAward,
    #[serde(skip_serializing_if = "Option::is_none")]
    level_up: Option<LevelUp>,
    new_achievements: Vec<UnlockedAchievement>,
    current_streak: i32,
    user: UserState,
    notifications: Vec<String>,
}

/// POST /progress/track-advanced - Record an activity with the full award breakdown
async fn track_advanced(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(action): Json<RawAction>,
) -> Result<Json<TrackAdvancedResponse>, ApiError> {
    let outcome = state
        .recorder
        .record_activity(&action, &client, None, Utc::now())
        .await?;

    Ok(Json(TrackAdvancedResponse {
        success: true,
        xp: outcome.xp,
        level_up: outcome.level_up,
        new_achievements: outcome.new_achievements,
        current_streak: outcome.current_streak,
        user: outcome.user,
        notifications: outcome.notifications,
    }))
}

#[derive(Serialize)]
struct BonusResponse {
    success: bool,
    #[serde(flatten)]
    grant: BonusGrant,
}

impl From<BonusGrant> for BonusResponse {
    fn from(grant: BonusGrant) -> Self {
        Self {
            success: true,
            grant,
        }
    }
}

fn check_ping_budget(state: &AppState, user_id: Option<i64>) -> Result<(), Rejection> {
    match user_id {
        Some(id) if !state.ping_limiter.check(id) => {
            Err(Rejection::new("too many bonus requests, slow down"))
        }
        _ => Ok(()),
    }
}

/// POST /progress/watch-bonus - XP for watched minutes, scaled by engagement
async fn watch_bonus(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchBonusRequest>,
) -> Result<Json<BonusResponse>, ApiError> {
    check_ping_budget(&state, req.user_id)?;
    let grant = bonuses::grant_watch_bonus(state.store.as_ref(), &req).await?;
    Ok(Json(grant.into()))
}

/// POST /progress/video-complete - Once-per-day completion bonus for a video
async fn video_complete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompletionBonusRequest>,
) -> Result<Json<BonusResponse>, ApiError> {
    check_ping_budget(&state, req.user_id)?;
    let today = state.today();
    let grant = bonuses::grant_completion_bonus(state.store.as_ref(), &req, today).await?;
    Ok(Json(grant.into()))
}

/// POST /progress/engagement-bonus - Once-per-day engagement bonus for a video
async fn engagement_bonus(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EngagementBonusRequest>,
) -> Result<Json<BonusResponse>, ApiError> {
    check_ping_budget(&state, req.user_id)?;
    let today = state.today();
    let grant = bonuses::grant_engagement_bonus(state.store.as_ref(), &req, today).await?;
    Ok(Json(grant.into()))
}
