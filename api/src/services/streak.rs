//! Consecutive-day streaks from the daily activity log

use chrono::NaiveDate;
use std::collections::HashSet;

/// Count consecutive days with activity, walking back from `today`.
///
/// A day without activity breaks the streak, except today itself: until the
/// first action of the day is recorded, the streak still ends yesterday.
pub fn current_streak(activity_dates: &[NaiveDate], today: NaiveDate) -> i32 {
    let days: HashSet<NaiveDate> = activity_dates.iter().copied().collect();

    let start = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };

    let mut streak = 0;
    let mut cursor = start;
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak += 1;
        cursor = day.pred_opt();
    }
    streak
}

/// Streak once today's activity is counted
pub fn streak_including_today(streak_before: i32, active_today: bool) -> i32 {
    if active_today {
        streak_before
    } else {
        streak_before + 1
    }
}
