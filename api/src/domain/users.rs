//! User domain - DB queries for user progress state
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};

use crate::models::{ProgressDelta, UserState};

/// Totals read under a row lock before an update
#[derive(Debug, sqlx::FromRow)]
pub struct LockedTotals {
    pub total_xp: i64,
    pub best_streak: i32,
}

/// Get a user's progress state, including unlocked achievement ids
pub async fn get_user_state<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<UserState>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT
            u.id, u.total_xp, u.level, u.current_streak, u.best_streak, u.last_active,
            u.videos_watched, u.likes_given, u.quizzes_completed, u.challenges_completed,
            u.early_bird_sessions, u.night_owl_sessions, u.weekend_sessions,
            ARRAY(
                SELECT a.achievement_id FROM user_achievements a
                WHERE a.user_id = u.id
                ORDER BY a.unlocked_at, a.achievement_id
            ) AS unlocked_achievements
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Lock the user row for the rest of the transaction and read its totals
pub async fn lock_user_totals<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<LockedTotals>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT total_xp, best_streak FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Write new totals and apply counter increments.
/// `total_xp` and `level` are computed by the caller under the row lock.
pub async fn update_user_progress<'e, E>(
    executor: E,
    user_id: i64,
    total_xp: i64,
    level: i32,
    best_streak: i32,
    delta: &ProgressDelta,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE users SET
            total_xp = $2,
            level = $3,
            best_streak = $4,
            current_streak = COALESCE($5, current_streak),
            last_active = COALESCE($6, last_active),
            videos_watched = videos_watched + $7,
            likes_given = likes_given + $8,
            quizzes_completed = quizzes_completed + $9,
            challenges_completed = challenges_completed + $10,
            early_bird_sessions = early_bird_sessions + $11,
            night_owl_sessions = night_owl_sessions + $12,
            weekend_sessions = weekend_sessions + $13
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(total_xp)
    .bind(level)
    .bind(best_streak)
    .bind(delta.current_streak)
    .bind(delta.last_active)
    .bind(delta.videos_watched)
    .bind(delta.likes_given)
    .bind(delta.quizzes_completed)
    .bind(delta.challenges_completed)
    .bind(delta.early_bird_sessions)
    .bind(delta.night_owl_sessions)
    .bind(delta.weekend_sessions)
    .execute(executor)
    .await?;

    Ok(())
}
