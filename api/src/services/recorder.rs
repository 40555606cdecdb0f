//! Progress recorder: the accept-and-award pipeline for one action.
//!
//! Order of operations for `record_activity`, all under the user's lock:
//! rate limits and validation, user lookup, XP award, one atomic progress
//! update, achievement unlocks, then the best-effort action log and daily
//! marker. A rejection or a missing user leaves the store untouched apart
//! from the failure audit entry.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Rules;
use crate::constants::*;
use crate::models::{
    ClientInfo, NewActionRecord, ProgressDelta, RawAction, UserAction, UserState,
    ValidationFailure,
};
use crate::services::achievements::{self, Achievement};
use crate::services::anti_cheat::{parse_action, validate_action};
use crate::services::error::{Rejection, best_effort};
use crate::services::metrics::Metrics;
use crate::services::rate_limit::{check_rate_limit, limitable_ip};
use crate::services::streak::{current_streak, streak_including_today};
use crate::services::user_locks::UserLocks;
use crate::services::xp::{self, XpAward, XpContext, calculate_award};
use crate::store::{ProgressStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RecordError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => RecordError::UserNotFound(id),
            other => RecordError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub previous_level: i32,
    pub new_level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievement {
    pub id: String,
    pub name: String,
    pub xp_reward: i64,
}

impl From<&Achievement> for UnlockedAchievement {
    fn from(achievement: &Achievement) -> Self {
        Self {
            id: achievement.id.to_string(),
            name: achievement.name.to_string(),
            xp_reward: achievement.xp_reward,
        }
    }
}

/// Everything the client is told about an accepted action
#[derive(Debug, Clone)]
pub struct ActivityOutcome {
    pub xp: XpAward,
    pub level_up: Option<LevelUp>,
    pub new_achievements: Vec<UnlockedAchievement>,
    pub current_streak: i32,
    pub user: UserState,
    pub notifications: Vec<String>,
}

#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn ProgressStore>,
    rules: Rules,
    locks: UserLocks,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn ProgressStore>, rules: Rules, locks: UserLocks) -> Self {
        Self {
            store,
            rules,
            locks,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Run the rate limiter and validator without recording anything.
    /// The client timestamp is mandatory here.
    pub async fn validate_only(
        &self,
        raw: &RawAction,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        let result = async {
            let action = parse_action(raw, None)?;
            Metrics::from_metadata(&action.metadata)?;
            self.screen(&action, client, now).await
        }
        .await;

        self.audit_rejection(result, raw, client, now).await
    }

    /// Validate, award and persist one action.
    ///
    /// `points_cap` is the client's claimed award; it can only lower the
    /// computed one. A missing timestamp defaults to `now`.
    pub async fn record_activity(
        &self,
        raw: &RawAction,
        client: &ClientInfo,
        points_cap: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ActivityOutcome, RecordError> {
        let parsed = parse_action(raw, Some(now)).and_then(|action| {
            let metrics = Metrics::from_metadata(&action.metadata)?;
            Ok((action, metrics))
        });
        let (action, metrics) = self
            .audit_rejection(parsed.map_err(RecordError::from), raw, client, now)
            .await?;

        let _guard = self.locks.acquire(action.user_id).await;

        let screened = self.screen(&action, client, now).await;
        self.audit_rejection(screened, raw, client, now).await?;

        self.record_accepted(action, metrics, client, points_cap, now)
            .await
    }

    /// Rate limits first, then the validator, against fresh history
    async fn screen(
        &self,
        action: &UserAction,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        let limits = &self.rules.rate_limits;
        let policy = &self.rules.validation;

        let ip = client.ip.as_deref();
        let ip_history = match limitable_ip(ip) {
            Some(addr) => {
                self.store
                    .recent_ip_actions(&addr.to_string(), now - limits.ip_lookback())
                    .await?
            }
            None => Vec::new(),
        };

        let lookback = policy.lookback().max(limits.per_user.window);
        let user_history = self
            .store
            .recent_user_actions(action.user_id, now - lookback)
            .await?;

        check_rate_limit(
            ip,
            &ip_history,
            action.user_id,
            &user_history,
            limits,
            now,
        )?;
        validate_action(action, &user_history, policy, now)?;

        Ok(())
    }

    async fn record_accepted(
        &self,
        action: UserAction,
        metrics: Metrics,
        client: &ClientInfo,
        points_cap: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ActivityOutcome, RecordError> {
        let user_id = action.user_id;
        let before = self
            .store
            .load_user(user_id)
            .await?
            .ok_or(RecordError::UserNotFound(user_id))?;

        let is_first_time = !self
            .store
            .has_prior_action(user_id, &action.action_type, action.targets.primary())
            .await?;

        let clock = LocalClock::new(now, self.rules.utc_offset);
        let dates = self.store.activity_dates(user_id, clock.today).await?;
        let active_today = dates.contains(&clock.today);
        let streak_before = current_streak(&dates, clock.today);
        let streak_after = streak_including_today(streak_before, active_today);

        let ctx = XpContext {
            current_streak: streak_before,
            is_first_time,
            study_duration_minutes: metrics.study_duration_minutes,
            is_weekend: clock.is_weekend,
            hour: clock.hour,
        };
        let mut award = calculate_award(&action.action_type, &metrics, &ctx);
        if let Some(cap) = points_cap {
            award = award.capped(cap);
        }

        let delta = progress_delta(
            &action.action_type,
            &award,
            &clock,
            active_today,
            streak_after,
            now,
        );
        let mut user = self.store.apply_progress(user_id, &delta).await?;

        let mut new_achievements = Vec::new();
        // Achievement XP can raise the level, which can unlock more
        loop {
            let pending: Vec<_> = achievements::newly_unlocked(&user)
                .into_iter()
                .map(|a| a.unlock())
                .collect();
            if pending.is_empty() {
                break;
            }
            let outcome = self.store.unlock_achievements(user_id, &pending).await?;
            user = outcome.user;
            if outcome.unlocked.is_empty() {
                break;
            }
            new_achievements.extend(
                outcome
                    .unlocked
                    .iter()
                    .filter_map(|id| achievements::find(id))
                    .map(UnlockedAchievement::from),
            );
        }

        let previous_level = xp::calculate_level(before.total_xp);
        let level_up = (user.level > previous_level).then_some(LevelUp {
            previous_level,
            new_level: user.level,
        });

        let record = NewActionRecord {
            action,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            xp_awarded: award.total_xp,
            created_at: now,
        };
        best_effort("Action log insert", self.store.insert_action(&record)).await;
        best_effort(
            "Daily activity upsert",
            self.store.upsert_daily_activity(user_id, clock.today),
        )
        .await;

        let notifications = notifications(
            &award,
            level_up,
            &new_achievements,
            streak_after,
            active_today,
        );

        debug!(
            user_id,
            action_type = %record.action.action_type,
            xp = award.total_xp,
            total_xp = user.total_xp,
            "Action recorded"
        );

        Ok(ActivityOutcome {
            xp: award,
            level_up,
            new_achievements,
            current_streak: streak_after,
            user,
            notifications,
        })
    }

    /// Write a failure audit entry for a rejection and pass the result through
    async fn audit_rejection<T>(
        &self,
        result: Result<T, RecordError>,
        raw: &RawAction,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<T, RecordError> {
        if let Err(RecordError::Rejected(rejection)) = &result {
            info!(
                user_id = ?raw.user_id,
                action_type = ?raw.action_type,
                reason = %rejection.reason,
                "Action rejected"
            );
            let failure = ValidationFailure {
                user_id: raw.user_id,
                action_type: raw.action_type.clone(),
                target_id: raw.targets.primary().map(str::to_string),
                reason: rejection.reason.clone(),
                ip_address: client.ip.clone(),
                created_at: now,
            };
            best_effort(
                "Validation failure audit",
                self.store.log_validation_failure(&failure),
            )
            .await;
        }
        result
    }
}

/// Calendar facts of `now` in the configured offset
struct LocalClock {
    today: NaiveDate,
    hour: u32,
    is_weekend: bool,
}

impl LocalClock {
    fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self {
            today: local.date_naive(),
            hour: local.hour(),
            is_weekend: xp::is_weekend(local.weekday()),
        }
    }
}

fn progress_delta(
    action_type: &str,
    award: &XpAward,
    clock: &LocalClock,
    active_today: bool,
    streak_after: i32,
    now: DateTime<Utc>,
) -> ProgressDelta {
    let mut delta = ProgressDelta {
        xp: award.total_xp,
        current_streak: Some(streak_after),
        last_active: Some(now),
        ..Default::default()
    };

    match action_type {
        ACTION_VIDEO_WATCH => delta.videos_watched = 1,
        ACTION_VIDEO_LIKE => delta.likes_given = 1,
        ACTION_QUIZ_COMPLETE => delta.quizzes_completed = 1,
        ACTION_CHALLENGE_COMPLETE => delta.challenges_completed = 1,
        _ => {}
    }

    // Sessions count once per day, on the first action of the day
    if !active_today {
        if xp::is_early_bird(clock.hour) {
            delta.early_bird_sessions = 1;
        }
        if xp::is_night_owl(clock.hour) {
            delta.night_owl_sessions = 1;
        }
        if clock.is_weekend {
            delta.weekend_sessions = 1;
        }
    }

    delta
}

fn notifications(
    award: &XpAward,
    level_up: Option<LevelUp>,
    unlocked: &[UnlockedAchievement],
    streak: i32,
    active_today: bool,
) -> Vec<String> {
    let mut messages = vec![format!("+{} XP", award.total_xp)];
    if let Some(level_up) = level_up {
        messages.push(format!("Level up! You reached level {}", level_up.new_level));
    }
    for achievement in unlocked {
        messages.push(format!(
            "Achievement unlocked: {} (+{} XP)",
            achievement.name, achievement.xp_reward
        ));
    }
    if !active_today && streak > 1 {
        messages.push(format!("{}-day streak!", streak));
    }
    messages
}
