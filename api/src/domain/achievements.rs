//! Achievements domain - unlocked achievements per user

use sqlx::{Executor, Postgres};

/// Record an unlock. Returns false if the user already had it, in which
/// case no XP must be granted.
pub async fn insert_unlock<'e, E>(
    executor: E,
    user_id: i64,
    achievement_id: &str,
    xp_awarded: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO user_achievements (user_id, achievement_id, xp_awarded)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, achievement_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(achievement_id)
    .bind(xp_awarded)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
