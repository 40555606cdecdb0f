//! XP calculation and level derivation.
//!
//! Three reward policies live here, each for a different trigger:
//! - `calculate_award` for discrete actions (like, watch, quiz, ...)
//! - `watch_time_bonus` for periodic watch-time pings
//! - `completion_bonus` for the end-of-video event
//!
//! `calculate_level` is the only place a level is derived from XP.

use chrono::Weekday;
use serde::Serialize;

use crate::constants::*;
use crate::services::metrics::Metrics;

/// Facts about the user that shape an award
#[derive(Debug, Clone, Copy, Default)]
pub struct XpContext {
    /// Streak before this action is recorded
    pub current_streak: i32,
    pub is_first_time: bool,
    pub study_duration_minutes: Option<f64>,
    pub is_weekend: bool,
    /// Local hour of the action, 0-23
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpBonus {
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpAward {
    #[serde(rename = "baseXP")]
    pub base_xp: i64,
    pub bonuses: Vec<XpBonus>,
    #[serde(rename = "totalXP")]
    pub total_xp: i64,
}

impl XpAward {
    /// Lower the total to a client-requested amount; never raises it.
    pub fn capped(mut self, cap: i64) -> Self {
        self.total_xp = self.total_xp.min(cap.max(0));
        self
    }
}

pub fn base_xp(action_type: &str) -> i64 {
    match action_type {
        ACTION_VIDEO_LIKE => BASE_XP_VIDEO_LIKE,
        ACTION_VIDEO_WATCH => BASE_XP_VIDEO_WATCH,
        ACTION_QUIZ_COMPLETE => BASE_XP_QUIZ_COMPLETE,
        ACTION_CHALLENGE_COMPLETE => BASE_XP_CHALLENGE_COMPLETE,
        _ => BASE_XP_DEFAULT,
    }
}

/// Compute the award for a discrete action
pub fn calculate_award(action_type: &str, metrics: &Metrics, ctx: &XpContext) -> XpAward {
    let base = base_xp(action_type);
    let mut bonuses = Vec::new();

    if metrics
        .engagement_score
        .is_some_and(|score| score > ENGAGEMENT_BONUS_THRESHOLD)
    {
        bonuses.push(bonus("High engagement", ENGAGEMENT_BONUS_XP));
    }

    if ctx.is_first_time {
        bonuses.push(bonus("First time", FIRST_TIME_BONUS_XP));
    }

    // Informational entries, listed for transparency only
    if ctx.current_streak > 0 {
        bonuses.push(bonus(&format!("{}-day streak", ctx.current_streak), 0));
    }
    if ctx.is_weekend {
        bonuses.push(bonus("Weekend learning", 0));
    }
    if is_early_bird(ctx.hour) {
        bonuses.push(bonus("Early bird", 0));
    } else if is_night_owl(ctx.hour) {
        bonuses.push(bonus("Night owl", 0));
    }
    if let Some(minutes) = ctx.study_duration_minutes.filter(|m| *m > 0.0) {
        bonuses.push(bonus(&format!("Study session: {} min", minutes.floor()), 0));
    }

    let total = base + bonuses.iter().map(|b| b.amount).sum::<i64>();
    XpAward {
        base_xp: base,
        bonuses,
        total_xp: total,
    }
}

fn bonus(description: &str, amount: i64) -> XpBonus {
    XpBonus {
        description: description.to_string(),
        amount,
    }
}

/// level = floor(sqrt(total_xp / 100)) + 1
pub fn calculate_level(total_xp: i64) -> i32 {
    let units = (total_xp.max(0) / XP_PER_LEVEL_UNIT) as u64;
    // floor(sqrt(floor(x))) == floor(sqrt(x)) for x >= 0
    (units.isqrt() as i32).saturating_add(1)
}

/// Minimum total XP at which `level` is reached
pub fn level_threshold(level: i32) -> i64 {
    let steps = i64::from(level.max(1) - 1);
    XP_PER_LEVEL_UNIT * steps * steps
}

/// XP still needed to reach the next level
pub fn xp_to_next_level(total_xp: i64) -> i64 {
    level_threshold(calculate_level(total_xp) + 1) - total_xp.max(0)
}

pub fn is_early_bird(hour: u32) -> bool {
    (5..8).contains(&hour)
}

pub fn is_night_owl(hour: u32) -> bool {
    hour >= 22 || hour < 2
}

pub fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Watch-time ping reward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTimeBonus {
    /// XP per watched minute
    pub multiplier: i64,
    pub xp: i64,
}

pub fn watch_time_bonus(watch_time_minutes: f64, engagement_score: f64) -> WatchTimeBonus {
    let multiplier = match engagement_score {
        s if s >= 90.0 => 15,
        s if s >= 70.0 => 10,
        s if s >= 50.0 => 5,
        _ => 0,
    };
    let xp = (watch_time_minutes.max(0.0) * multiplier as f64).floor() as i64;
    WatchTimeBonus { multiplier, xp }
}

/// End-of-video reward, tiered by completion and engagement percentages
pub fn completion_bonus(completion_percentage: f64, engagement_percentage: f64) -> i64 {
    let full = match engagement_percentage {
        e if e >= 80.0 => 100,
        e if e >= 60.0 => 75,
        _ => 50,
    };
    if completion_percentage >= 90.0 {
        full
    } else if completion_percentage >= 70.0 {
        // Partial completions earn 70% of the full tier
        full * 7 / 10
    } else {
        0
    }
}

/// Standalone engagement reward
pub fn engagement_bonus(engagement_score: f64) -> i64 {
    if engagement_score > ENGAGEMENT_BONUS_THRESHOLD {
        ENGAGEMENT_BONUS_XP
    } else {
        0
    }
}
