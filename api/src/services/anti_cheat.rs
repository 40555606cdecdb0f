//! Anti-cheat validation of a single action against the user's history.
//!
//! Everything here is a pure function of the action, the history, the policy
//! and `now`, so it can be tested without a store.

use chrono::{DateTime, Utc};

use crate::config::ValidationPolicy;
use crate::models::{ActionRecord, RawAction, UserAction};
use crate::services::error::Rejection;

/// Structural check: turn a client body into a `UserAction`.
///
/// `default_timestamp` is used when the client sent none; pass `None` where
/// the timestamp is mandatory.
pub fn parse_action(
    raw: &RawAction,
    default_timestamp: Option<DateTime<Utc>>,
) -> Result<UserAction, Rejection> {
    let user_id = raw.user_id.ok_or_else(|| Rejection::new("missing userId"))?;

    let action_type = raw
        .action_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Rejection::new("missing action type"))?;

    let timestamp = match raw.timestamp {
        Some(ms) => {
            DateTime::from_timestamp_millis(ms).ok_or_else(|| Rejection::new("invalid timestamp"))?
        }
        None => default_timestamp.ok_or_else(|| Rejection::new("missing timestamp"))?,
    };

    Ok(UserAction {
        user_id,
        action_type: action_type.to_string(),
        targets: raw.targets.clone(),
        timestamp,
        metadata: raw.metadata.clone().unwrap_or_default(),
    })
}

/// Validate an action against the user's recent history.
pub fn validate_action(
    action: &UserAction,
    history: &[ActionRecord],
    policy: &ValidationPolicy,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    check_clock(action, policy, now)?;
    check_cooldown(action, history, policy, now)
}

/// Clock-skew and replay guard on the client timestamp
fn check_clock(
    action: &UserAction,
    policy: &ValidationPolicy,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    if action.timestamp > now + policy.max_future_skew {
        return Err(Rejection::new("action timestamp is in the future"));
    }
    if action.timestamp < now - policy.max_action_age {
        return Err(Rejection::new("action timestamp is too old"));
    }
    Ok(())
}

fn check_cooldown(
    action: &UserAction,
    history: &[ActionRecord],
    policy: &ValidationPolicy,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    let Some(interval) = policy.cooldown_for(&action.action_type) else {
        return Ok(());
    };
    let target = action.targets.primary();

    // The most recent matching record is the closest violation
    let closest = history
        .iter()
        .filter(|record| {
            record.user_id == action.user_id
                && record.action_type == action.action_type
                && record.targets.primary() == target
        })
        .max_by_key(|record| record.created_at);

    if let Some(record) = closest {
        let elapsed = now - record.created_at;
        if elapsed < interval {
            return Err(Rejection::new(format!(
                "{} is on cooldown, please wait",
                action.action_type
            ))
            .with_cooldown((interval - elapsed).num_milliseconds()));
        }
    }

    Ok(())
}
