//! Bonus grants for watch-time pings, video completion and engagement.
//!
//! These endpoints fail open: once the input is sane the client always gets
//! a success response, and store failures only mean no XP was granted.
//! Completion and engagement bonuses are claimable once per video per day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{BONUS_KIND_ENGAGEMENT, BONUS_KIND_VIDEO_COMPLETE};
use crate::models::ProgressDelta;
use crate::services::error::{Rejection, best_effort};
use crate::services::metrics;
use crate::services::xp::{completion_bonus, engagement_bonus, watch_time_bonus};
use crate::store::ProgressStore;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchBonusRequest {
    pub user_id: Option<i64>,
    pub video_id: Option<String>,
    pub watch_time_minutes: Option<f64>,
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionBonusRequest {
    pub user_id: Option<i64>,
    pub video_id: Option<String>,
    pub completion_percentage: Option<f64>,
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementBonusRequest {
    pub user_id: Option<i64>,
    pub video_id: Option<String>,
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusGrant {
    pub xp_awarded: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_claimed: Option<bool>,
}

fn require_user(user_id: Option<i64>) -> Result<i64, Rejection> {
    user_id.ok_or_else(|| Rejection::new("missing userId"))
}

fn require_video(video_id: Option<&str>) -> Result<&str, Rejection> {
    video_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Rejection::new("missing videoId"))
}

/// Add XP, returning what was actually granted
async fn grant(store: &dyn ProgressStore, user_id: i64, xp: i64, context: &str) -> i64 {
    if xp <= 0 {
        return 0;
    }
    match best_effort(context, store.apply_progress(user_id, &ProgressDelta::xp(xp))).await {
        Some(_) => xp,
        None => 0,
    }
}

/// Take the once-per-day slot together with its XP. `None` means already claimed.
async fn claim_and_grant(
    store: &dyn ProgressStore,
    user_id: i64,
    kind: &str,
    video_id: &str,
    today: NaiveDate,
    xp: i64,
) -> Option<i64> {
    if xp <= 0 {
        return Some(0);
    }
    let claimed = best_effort(
        "Bonus claim",
        store.claim_bonus(user_id, kind, video_id, today, xp),
    )
    .await;

    match claimed {
        Some(true) => Some(xp),
        Some(false) => None,
        // Nothing was written, so the slot stays open for a retry
        None => Some(0),
    }
}

pub async fn grant_watch_bonus(
    store: &dyn ProgressStore,
    request: &WatchBonusRequest,
) -> Result<BonusGrant, Rejection> {
    let user_id = require_user(request.user_id)?;
    let minutes = metrics::watch_time(request.watch_time_minutes.unwrap_or(0.0))?;
    let engagement = metrics::engagement(request.engagement_score.unwrap_or(0.0))?;

    let bonus = watch_time_bonus(minutes, engagement);
    let xp_awarded = grant(store, user_id, bonus.xp, "Watch bonus grant").await;
    debug!(user_id, video_id = ?request.video_id, xp_awarded, "Watch bonus");

    Ok(BonusGrant {
        xp_awarded,
        multiplier: Some(bonus.multiplier),
        already_claimed: None,
    })
}

pub async fn grant_completion_bonus(
    store: &dyn ProgressStore,
    request: &CompletionBonusRequest,
    today: NaiveDate,
) -> Result<BonusGrant, Rejection> {
    let user_id = require_user(request.user_id)?;
    let video_id = require_video(request.video_id.as_deref())?;
    let completion = metrics::completion(request.completion_percentage.unwrap_or(0.0))?;
    let engagement = metrics::engagement(request.engagement_score.unwrap_or(0.0))?;

    let xp = completion_bonus(completion, engagement);
    let granted = claim_and_grant(
        store,
        user_id,
        BONUS_KIND_VIDEO_COMPLETE,
        video_id,
        today,
        xp,
    )
    .await;
    debug!(user_id, video_id, ?granted, "Completion bonus");

    Ok(BonusGrant {
        xp_awarded: granted.unwrap_or(0),
        multiplier: None,
        already_claimed: Some(granted.is_none()),
    })
}

pub async fn grant_engagement_bonus(
    store: &dyn ProgressStore,
    request: &EngagementBonusRequest,
    today: NaiveDate,
) -> Result<BonusGrant, Rejection> {
    let user_id = require_user(request.user_id)?;
    let video_id = require_video(request.video_id.as_deref())?;
    let engagement = metrics::engagement(request.engagement_score.unwrap_or(0.0))?;

    let xp = engagement_bonus(engagement);
    let granted = claim_and_grant(store, user_id, BONUS_KIND_ENGAGEMENT, video_id, today, xp).await;
    debug!(user_id, video_id, ?granted, "Engagement bonus");

    Ok(BonusGrant {
        xp_awarded: granted.unwrap_or(0),
        multiplier: None,
        already_claimed: Some(granted.is_none()),
    })
}
