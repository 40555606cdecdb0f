//! In-memory `ProgressStore` for service and router tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ProgressStore, StoreError};
use crate::models::{
    AchievementUnlock, ActionRecord, NewActionRecord, ProgressDelta, UnlockOutcome, UserState,
    ValidationFailure,
};
use crate::services::xp::calculate_level;

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, UserState>,
    actions: Vec<ActionRecord>,
    activity: BTreeMap<i64, BTreeMap<NaiveDate, u32>>,
    failures: Vec<ValidationFailure>,
    bonus_claims: HashSet<(i64, String, String, NaiveDate)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_audit: AtomicBool,
    fail_action_log: AtomicBool,
    fail_reads: AtomicBool,
    fail_progress: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with zeroed progress and return it
    pub fn add_user(&self, user_id: i64) -> UserState {
        self.put_user(UserState {
            id: user_id,
            level: 1,
            ..Default::default()
        })
    }

    pub fn put_user(&self, user: UserState) -> UserState {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, user_id: i64) -> Option<UserState> {
        self.inner.lock().unwrap().users.get(&user_id).cloned()
    }

    pub fn mark_active(&self, user_id: i64, date: NaiveDate) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .activity
            .entry(user_id)
            .or_default()
            .entry(date)
            .or_insert(1);
    }

    /// Seed a log entry as if it had been recorded at `created_at`
    pub fn push_record(&self, record: NewActionRecord) {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.actions.len() as i64 + 1;
        inner.actions.push(to_record(id, &record));
    }

    pub fn actions(&self) -> Vec<ActionRecord> {
        self.inner.lock().unwrap().actions.clone()
    }

    pub fn failures(&self) -> Vec<ValidationFailure> {
        self.inner.lock().unwrap().failures.clone()
    }

    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_action_log(&self, fail: bool) {
        self.fail_action_log.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make XP writes (progress updates and bonus claims) time out
    pub fn fail_progress(&self, fail: bool) {
        self.fail_progress.store(fail, Ordering::SeqCst);
    }

    fn check_progress(&self) -> Result<(), StoreError> {
        if self.fail_progress.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

fn to_record(id: i64, record: &NewActionRecord) -> ActionRecord {
    ActionRecord {
        id,
        user_id: record.action.user_id,
        action_type: record.action.action_type.clone(),
        targets: record.action.targets.clone(),
        client_timestamp: record.action.timestamp,
        metadata: record.action.metadata.clone(),
        ip_address: record.ip_address.clone(),
        user_agent: record.user_agent.clone(),
        xp_awarded: record.xp_awarded,
        created_at: record.created_at,
    }
}

fn apply_delta(user: &mut UserState, delta: &ProgressDelta) {
    user.total_xp = user.total_xp.saturating_add(delta.xp).max(0);
    user.level = calculate_level(user.total_xp);
    user.videos_watched += delta.videos_watched;
    user.likes_given += delta.likes_given;
    user.quizzes_completed += delta.quizzes_completed;
    user.challenges_completed += delta.challenges_completed;
    user.early_bird_sessions += delta.early_bird_sessions;
    user.night_owl_sessions += delta.night_owl_sessions;
    user.weekend_sessions += delta.weekend_sessions;
    if let Some(streak) = delta.current_streak {
        user.current_streak = streak;
        user.best_streak = user.best_streak.max(streak);
    }
    if let Some(at) = delta.last_active {
        user.last_active = Some(at);
    }
}

fn newest_first(mut records: Vec<ActionRecord>) -> Vec<ActionRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load_user(&self, user_id: i64) -> Result<Option<UserState>, StoreError> {
        self.check_reads()?;
        Ok(self.user(user_id))
    }

    async fn recent_user_actions(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().unwrap();
        let records = inner
            .actions
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn recent_ip_actions(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().unwrap();
        let records = inner
            .actions
            .iter()
            .filter(|r| r.ip_address.as_deref() == Some(ip) && r.created_at >= since)
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn has_prior_action(
        &self,
        user_id: i64,
        action_type: &str,
        target: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.actions.iter().any(|r| {
            r.user_id == user_id && r.action_type == action_type && r.targets.primary() == target
        }))
    }

    async fn activity_dates(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.lock().unwrap();
        let Some(days) = inner.activity.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut run: Vec<NaiveDate> = Vec::new();
        for day in days.range(..=today).map(|(day, _)| *day).rev() {
            if run.last().is_some_and(|last| last.pred_opt() != Some(day)) {
                break;
            }
            run.push(day);
        }
        Ok(run)
    }

    async fn apply_progress(
        &self,
        user_id: i64,
        delta: &ProgressDelta,
    ) -> Result<UserState, StoreError> {
        self.check_progress()?;
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;
        apply_delta(user, delta);
        Ok(user.clone())
    }

    async fn unlock_achievements(
        &self,
        user_id: i64,
        unlocks: &[AchievementUnlock],
    ) -> Result<UnlockOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;

        let mut unlocked = Vec::new();
        let mut xp = 0;
        for unlock in unlocks {
            if !user.has_achievement(&unlock.achievement_id) {
                user.unlocked_achievements
                    .push(unlock.achievement_id.clone());
                unlocked.push(unlock.achievement_id.clone());
                xp += unlock.xp_reward;
            }
        }
        apply_delta(user, &ProgressDelta::xp(xp));

        Ok(UnlockOutcome {
            unlocked,
            user: user.clone(),
        })
    }

    async fn insert_action(&self, record: &NewActionRecord) -> Result<i64, StoreError> {
        if self.fail_action_log.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        let mut inner = self.inner.lock().unwrap();
        let id = inner.actions.len() as i64 + 1;
        inner.actions.push(to_record(id, record));
        Ok(id)
    }

    async fn upsert_daily_activity(&self, user_id: i64, date: NaiveDate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        *inner
            .activity
            .entry(user_id)
            .or_default()
            .entry(date)
            .or_insert(0) += 1;
        Ok(())
    }

    async fn log_validation_failure(&self, failure: &ValidationFailure) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        self.inner.lock().unwrap().failures.push(failure.clone());
        Ok(())
    }

    async fn claim_bonus(
        &self,
        user_id: i64,
        kind: &str,
        video_id: &str,
        date: NaiveDate,
        xp: i64,
    ) -> Result<bool, StoreError> {
        self.check_reads()?;
        self.check_progress()?;
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;

        let claimed = inner
            .bonus_claims
            .insert((user_id, kind.to_string(), video_id.to_string(), date));
        if claimed {
            apply_delta(user, &ProgressDelta::xp(xp));
        }
        Ok(claimed)
    }
}
