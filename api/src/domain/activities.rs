//! Activities domain - DB queries for daily activity markers
//!
//! One row per user per calendar day with at least one accepted action.
//! Streaks are computed from these rows.

use chrono::NaiveDate;
use sqlx::{Executor, Postgres};

/// Mark a day as active, counting repeated actions on the same day
pub async fn upsert_daily_activity<'e, E>(
    executor: E,
    user_id: i64,
    activity_date: NaiveDate,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO user_daily_activity (user_id, activity_date, actions_count)
        VALUES ($1, $2, 1)
        ON CONFLICT (user_id, activity_date)
        DO UPDATE SET
            actions_count = user_daily_activity.actions_count + 1,
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(activity_date)
    .execute(executor)
    .await?;

    Ok(())
}

/// The latest run of consecutive active days up to `today`, most recent first.
///
/// Within a run `activity_date + row_number` is constant, and it is largest
/// for the most recent run, so older runs never leave the database.
pub async fn list_activity_dates<'e, E>(
    executor: E,
    user_id: i64,
    today: NaiveDate,
) -> Result<Vec<NaiveDate>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(NaiveDate,)> = sqlx::query_as(
        r#"
        WITH days AS (
            SELECT activity_date,
                   activity_date + (ROW_NUMBER() OVER (ORDER BY activity_date DESC))::int AS run
            FROM user_daily_activity
            WHERE user_id = $1 AND activity_date <= $2
        )
        SELECT activity_date FROM days
        WHERE run = (SELECT MAX(run) FROM days)
        ORDER BY activity_date DESC
        "#,
    )
    .bind(user_id)
    .bind(today)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(date,)| date).collect())
}
