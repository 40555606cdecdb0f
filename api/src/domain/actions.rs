//! Actions domain - the append-only user action log
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

use crate::models::{ActionRecord, NewActionRecord};

const RECORD_COLUMNS: &str = r#"
    id, user_id, action_type, video_id, module_id, course_id, quiz_id, challenge_id,
    client_timestamp, metadata, ip_address, user_agent, xp_awarded, created_at
"#;

/// Append an action record, returning its id
pub async fn insert_action<'e, E>(executor: E, record: &NewActionRecord) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let action = &record.action;
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO user_actions (
            user_id, action_type, video_id, module_id, course_id, quiz_id, challenge_id,
            client_timestamp, metadata, ip_address, user_agent, xp_awarded, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(action.user_id)
    .bind(&action.action_type)
    .bind(&action.targets.video_id)
    .bind(&action.targets.module_id)
    .bind(&action.targets.course_id)
    .bind(&action.targets.quiz_id)
    .bind(&action.targets.challenge_id)
    .bind(action.timestamp)
    .bind(Json(&action.metadata))
    .bind(&record.ip_address)
    .bind(&record.user_agent)
    .bind(record.xp_awarded)
    .bind(record.created_at)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// A user's actions recorded since `since`, most recent first
pub async fn list_user_actions_since<'e, E>(
    executor: E,
    user_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<ActionRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM user_actions WHERE user_id = $1 AND created_at >= $2 ORDER BY created_at DESC",
        RECORD_COLUMNS
    );
    sqlx::query_as(&sql)
        .bind(user_id)
        .bind(since)
        .fetch_all(executor)
        .await
}

/// Actions from one IP recorded since `since`, most recent first
pub async fn list_ip_actions_since<'e, E>(
    executor: E,
    ip_address: &str,
    since: DateTime<Utc>,
) -> Result<Vec<ActionRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM user_actions WHERE ip_address = $1 AND created_at >= $2 ORDER BY created_at DESC",
        RECORD_COLUMNS
    );
    sqlx::query_as(&sql)
        .bind(ip_address)
        .bind(since)
        .fetch_all(executor)
        .await
}

/// Whether the user ever recorded this action type on this target.
/// The target is the most specific id of the action (see `ActionTargets::primary`).
pub async fn has_prior_action<'e, E>(
    executor: E,
    user_id: i64,
    action_type: &str,
    target: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM user_actions
            WHERE user_id = $1
              AND action_type = $2
              AND COALESCE(video_id, quiz_id, challenge_id, module_id, course_id)
                  IS NOT DISTINCT FROM $3
        )
        "#,
    )
    .bind(user_id)
    .bind(action_type)
    .bind(target)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}
