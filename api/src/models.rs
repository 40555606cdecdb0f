//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key-value bag attached to an action by the client
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Content an action refers to. All ids are optional and opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActionTargets {
    pub video_id: Option<String>,
    pub module_id: Option<String>,
    pub course_id: Option<String>,
    pub quiz_id: Option<String>,
    pub challenge_id: Option<String>,
}

impl ActionTargets {
    /// The id cooldowns and first-time bonuses are keyed on: the most
    /// specific target present.
    pub fn primary(&self) -> Option<&str> {
        self.video_id
            .as_deref()
            .or(self.quiz_id.as_deref())
            .or(self.challenge_id.as_deref())
            .or(self.module_id.as_deref())
            .or(self.course_id.as_deref())
    }
}

/// Action body as sent by a client, before structural validation.
///
/// `/actions/*` send the type as `action`, `/progress/track-advanced` as
/// `activityType`; both land in `action_type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAction {
    pub user_id: Option<i64>,
    #[serde(alias = "action", alias = "activityType")]
    pub action_type: Option<String>,
    #[serde(flatten)]
    pub targets: ActionTargets,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    pub metadata: Option<Metadata>,
}

/// A structurally valid action, consumed once per validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct UserAction {
    pub user_id: i64,
    pub action_type: String,
    pub targets: ActionTargets,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Request origin as seen by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Canonical textual form of the client IP, if one could be parsed
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A persisted entry of the append-only action log
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionRecord {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    #[sqlx(flatten)]
    pub targets: ActionTargets,
    pub client_timestamp: DateTime<Utc>,
    #[sqlx(json)]
    pub metadata: Metadata,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub xp_awarded: i64,
    pub created_at: DateTime<Utc>,
}

/// Action log entry to append
#[derive(Debug, Clone)]
pub struct NewActionRecord {
    pub action: UserAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub xp_awarded: i64,
    pub created_at: DateTime<Utc>,
}

/// Progress state of a user, including the unlocked achievement ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub id: i64,
    #[serde(rename = "totalXP")]
    pub total_xp: i64,
    pub level: i32,
    pub current_streak: i32,
    pub best_streak: i32,
    pub last_active: Option<DateTime<Utc>>,
    pub videos_watched: i32,
    pub likes_given: i32,
    pub quizzes_completed: i32,
    pub challenges_completed: i32,
    pub early_bird_sessions: i32,
    pub night_owl_sessions: i32,
    pub weekend_sessions: i32,
    pub unlocked_achievements: Vec<String>,
}

impl UserState {
    pub fn has_achievement(&self, achievement_id: &str) -> bool {
        self.unlocked_achievements.iter().any(|id| id == achievement_id)
    }
}

/// Increments applied to a user in one atomic update.
/// `total_xp` and `level` are derived by the store, never set directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressDelta {
    pub xp: i64,
    pub videos_watched: i32,
    pub likes_given: i32,
    pub quizzes_completed: i32,
    pub challenges_completed: i32,
    pub early_bird_sessions: i32,
    pub night_owl_sessions: i32,
    pub weekend_sessions: i32,
    /// Replaces the current streak (and raises the best streak) when set
    pub current_streak: Option<i32>,
    pub last_active: Option<DateTime<Utc>>,
}

impl ProgressDelta {
    /// A plain XP grant with no counter changes
    pub fn xp(amount: i64) -> Self {
        Self {
            xp: amount,
            ..Default::default()
        }
    }
}

/// An achievement to insert together with the XP it grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementUnlock {
    pub achievement_id: String,
    pub xp_reward: i64,
}

/// Result of an unlock attempt: only the ids that were not already present
#[derive(Debug, Clone)]
pub struct UnlockOutcome {
    pub unlocked: Vec<String>,
    pub user: UserState,
}

/// Audit entry for a rejected action
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
    pub target_id: Option<String>,
    pub reason: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}
