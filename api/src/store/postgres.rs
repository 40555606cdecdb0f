//! Postgres-backed `ProgressStore`
//!
//! Every call is bounded by the configured timeout. XP updates run in a
//! transaction holding the user row lock, so concurrent awards are never
//! lost to a read-modify-write race.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

use super::{ProgressStore, StoreError};
use crate::domain::{achievements, actions, activities, audit, users};
use crate::models::{
    AchievementUnlock, ActionRecord, NewActionRecord, ProgressDelta, UnlockOutcome, UserState,
    ValidationFailure,
};
use crate::services::xp::calculate_level;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Lock the user row, add `delta` and write back. Must run inside a transaction.
    async fn apply_locked(
        conn: &mut sqlx::PgConnection,
        user_id: i64,
        delta: &ProgressDelta,
    ) -> Result<(), StoreError> {
        let totals = users::lock_user_totals(&mut *conn, user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;

        let total_xp = totals.total_xp.saturating_add(delta.xp).max(0);
        let best_streak = delta
            .current_streak
            .map_or(totals.best_streak, |streak| streak.max(totals.best_streak));

        users::update_user_progress(
            &mut *conn,
            user_id,
            total_xp,
            calculate_level(total_xp),
            best_streak,
            delta,
        )
        .await?;

        Ok(())
    }

    async fn reload(conn: &mut sqlx::PgConnection, user_id: i64) -> Result<UserState, StoreError> {
        users::get_user_state(&mut *conn, user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn load_user(&self, user_id: i64) -> Result<Option<UserState>, StoreError> {
        self.bounded(async { Ok(users::get_user_state(&self.pool, user_id).await?) })
            .await
    }

    async fn recent_user_actions(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.bounded(async {
            Ok(actions::list_user_actions_since(&self.pool, user_id, since).await?)
        })
        .await
    }

    async fn recent_ip_actions(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.bounded(async { Ok(actions::list_ip_actions_since(&self.pool, ip, since).await?) })
            .await
    }

    async fn has_prior_action(
        &self,
        user_id: i64,
        action_type: &str,
        target: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.bounded(async {
            Ok(actions::has_prior_action(&self.pool, user_id, action_type, target).await?)
        })
        .await
    }

    async fn activity_dates(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        self.bounded(async {
            Ok(activities::list_activity_dates(&self.pool, user_id, today).await?)
        })
        .await
    }

    async fn apply_progress(
        &self,
        user_id: i64,
        delta: &ProgressDelta,
    ) -> Result<UserState, StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            Self::apply_locked(&mut tx, user_id, delta).await?;
            let user = Self::reload(&mut tx, user_id).await?;
            tx.commit().await?;
            Ok(user)
        })
        .await
    }

    async fn unlock_achievements(
        &self,
        user_id: i64,
        unlocks: &[AchievementUnlock],
    ) -> Result<UnlockOutcome, StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            // Lock first so concurrent unlocks of the same user serialize
            users::lock_user_totals(&mut *tx, user_id)
                .await?
                .ok_or(StoreError::UserNotFound(user_id))?;

            let mut unlocked = Vec::new();
            let mut xp = 0;
            for unlock in unlocks {
                let inserted = achievements::insert_unlock(
                    &mut *tx,
                    user_id,
                    &unlock.achievement_id,
                    unlock.xp_reward,
                )
                .await?;
                if inserted {
                    xp += unlock.xp_reward;
                    unlocked.push(unlock.achievement_id.clone());
                }
            }

            if xp != 0 {
                Self::apply_locked(&mut tx, user_id, &ProgressDelta::xp(xp)).await?;
            }
            let user = Self::reload(&mut tx, user_id).await?;
            tx.commit().await?;

            Ok(UnlockOutcome { unlocked, user })
        })
        .await
    }

    async fn insert_action(&self, record: &NewActionRecord) -> Result<i64, StoreError> {
        self.bounded(async { Ok(actions::insert_action(&self.pool, record).await?) })
            .await
    }

    async fn upsert_daily_activity(&self, user_id: i64, date: NaiveDate) -> Result<(), StoreError> {
        self.bounded(async {
            Ok(activities::upsert_daily_activity(&self.pool, user_id, date).await?)
        })
        .await
    }

    async fn log_validation_failure(&self, failure: &ValidationFailure) -> Result<(), StoreError> {
        self.bounded(async { Ok(audit::insert_validation_failure(&self.pool, failure).await?) })
            .await
    }

    async fn claim_bonus(
        &self,
        user_id: i64,
        kind: &str,
        video_id: &str,
        date: NaiveDate,
        xp: i64,
    ) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            users::lock_user_totals(&mut *tx, user_id)
                .await?
                .ok_or(StoreError::UserNotFound(user_id))?;

            let claimed =
                audit::insert_bonus_claim(&mut *tx, user_id, kind, video_id, date, xp).await?;
            if claimed {
                Self::apply_locked(&mut tx, user_id, &ProgressDelta::xp(xp)).await?;
            }
            tx.commit().await?;

            Ok(claimed)
        })
        .await
    }
}
