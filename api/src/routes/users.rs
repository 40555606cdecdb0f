//! Progress view and achievement catalog (/users/{id}/progress, /achievements)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::models::UserState;
use crate::services::achievements::{self, Achievement};
use crate::services::error::LogErr;
use crate::services::recorder::UnlockedAchievement;
use crate::services::xp::xp_to_next_level;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{id}/progress", get(get_progress))
        .route("/achievements", get(list_achievements))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressView {
    level: i32,
    xp_to_next_level: i64,
    achievements: Vec<UnlockedAchievement>,
    user: UserState,
}

/// GET /users/{id}/progress
async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<ProgressView>, StatusCode> {
    let user = state
        .store
        .load_user(user_id)
        .await
        .log_500("Load user progress error")?
        .ok_or(StatusCode::NOT_FOUND)?;

    let unlocked = user
        .unlocked_achievements
        .iter()
        .filter_map(|id| achievements::find(id))
        .map(UnlockedAchievement::from)
        .collect();

    Ok(Json(ProgressView {
        level: user.level,
        xp_to_next_level: xp_to_next_level(user.total_xp),
        achievements: unlocked,
        user,
    }))
}

/// GET /achievements - The static catalog
async fn list_achievements() -> Json<&'static [Achievement]> {
    Json(achievements::CATALOG)
}
