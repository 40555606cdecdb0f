//! Storage seam for the progress pipeline.
//!
//! Services depend on `ProgressStore` instead of a pool so the validator and
//! recorder can run against the in-memory store in tests. The Postgres
//! implementation wraps the `domain` query functions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    AchievementUnlock, ActionRecord, NewActionRecord, ProgressDelta, UnlockOutcome, UserState,
    ValidationFailure,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store call timed out")]
    Timeout,
    #[error("user {0} not found")]
    UserNotFound(i64),
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load_user(&self, user_id: i64) -> Result<Option<UserState>, StoreError>;

    /// A user's records created at or after `since`
    async fn recent_user_actions(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError>;

    /// Records from one IP created at or after `since`
    async fn recent_ip_actions(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError>;

    async fn has_prior_action(
        &self,
        user_id: i64,
        action_type: &str,
        target: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// The latest run of consecutive active days up to `today`, most recent first
    async fn activity_dates(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;

    /// Atomically add `delta` to the user. Total XP never drops below zero
    /// and the level is recomputed from the new total.
    async fn apply_progress(
        &self,
        user_id: i64,
        delta: &ProgressDelta,
    ) -> Result<UserState, StoreError>;

    /// Insert unlocks that are not present yet and grant only their XP,
    /// in one atomic update.
    async fn unlock_achievements(
        &self,
        user_id: i64,
        unlocks: &[AchievementUnlock],
    ) -> Result<UnlockOutcome, StoreError>;

    async fn insert_action(&self, record: &NewActionRecord) -> Result<i64, StoreError>;

    async fn upsert_daily_activity(&self, user_id: i64, date: NaiveDate) -> Result<(), StoreError>;

    async fn log_validation_failure(&self, failure: &ValidationFailure) -> Result<(), StoreError>;

    /// Take the (user, kind, video, day) bonus slot and add its XP, atomically.
    /// False if the slot was already taken; on error neither is written.
    async fn claim_bonus(
        &self,
        user_id: i64,
        kind: &str,
        video_id: &str,
        date: NaiveDate,
        xp: i64,
    ) -> Result<bool, StoreError>;
}
