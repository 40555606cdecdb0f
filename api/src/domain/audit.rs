//! Audit domain - validation failures and once-per-day bonus claims

use chrono::NaiveDate;
use sqlx::{Executor, Postgres};

use crate::models::ValidationFailure;

/// Append a rejected action to the failure audit trail
pub async fn insert_validation_failure<'e, E>(
    executor: E,
    failure: &ValidationFailure,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO action_validation_failures
            (user_id, action_type, target_id, reason, ip_address, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(failure.user_id)
    .bind(&failure.action_type)
    .bind(&failure.target_id)
    .bind(&failure.reason)
    .bind(&failure.ip_address)
    .bind(failure.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Claim a bonus slot keyed on (user, kind, video, day).
/// Returns false if the slot was already taken.
pub async fn insert_bonus_claim<'e, E>(
    executor: E,
    user_id: i64,
    bonus_kind: &str,
    video_id: &str,
    claim_date: NaiveDate,
    xp_awarded: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO bonus_claims (user_id, bonus_kind, video_id, claim_date, xp_awarded)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, bonus_kind, video_id, claim_date) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(bonus_kind)
    .bind(video_id)
    .bind(claim_date)
    .bind(xp_awarded)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
