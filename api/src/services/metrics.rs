//! Sanitisation of client-reported metrics.
//!
//! Engagement, watch time and completion are untrusted: every value that can
//! influence an award goes through here before use.

use serde_json::Value;

use crate::constants::{MAX_STUDY_DURATION_MINUTES, MAX_WATCH_TIME_MINUTES};
use crate::models::Metadata;
use crate::services::error::Rejection;

pub const ENGAGEMENT_SCORE: &str = "engagementScore";
pub const WATCH_TIME_MINUTES: &str = "watchTimeMinutes";
pub const COMPLETION_PERCENTAGE: &str = "completionPercentage";
pub const STUDY_DURATION_MINUTES: &str = "studyDurationMinutes";

/// Metrics extracted from an action's metadata, all range-checked
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub engagement_score: Option<f64>,
    pub watch_time_minutes: Option<f64>,
    pub completion_percentage: Option<f64>,
    pub study_duration_minutes: Option<f64>,
}

impl Metrics {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, Rejection> {
        Ok(Self {
            engagement_score: read(metadata, ENGAGEMENT_SCORE, 0.0, 100.0)?,
            watch_time_minutes: read(metadata, WATCH_TIME_MINUTES, 0.0, MAX_WATCH_TIME_MINUTES)?,
            completion_percentage: read(metadata, COMPLETION_PERCENTAGE, 0.0, 100.0)?,
            study_duration_minutes: read(
                metadata,
                STUDY_DURATION_MINUTES,
                0.0,
                MAX_STUDY_DURATION_MINUTES,
            )?,
        })
    }
}

fn read(metadata: &Metadata, key: &str, min: f64, max: f64) -> Result<Option<f64>, Rejection> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let value = n.as_f64().ok_or_else(|| invalid(key))?;
            check_range(key, value, min, max).map(Some)
        }
        Some(_) => Err(invalid(key)),
    }
}

/// Range check for a metric supplied as a typed field
pub fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<f64, Rejection> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(invalid(name))
    }
}

pub fn engagement(value: f64) -> Result<f64, Rejection> {
    check_range(ENGAGEMENT_SCORE, value, 0.0, 100.0)
}

pub fn watch_time(value: f64) -> Result<f64, Rejection> {
    check_range(WATCH_TIME_MINUTES, value, 0.0, MAX_WATCH_TIME_MINUTES)
}

pub fn completion(value: f64) -> Result<f64, Rejection> {
    check_range(COMPLETION_PERCENTAGE, value, 0.0, 100.0)
}

fn invalid(key: &str) -> Rejection {
    Rejection::new(format!("invalid {}", key))
}
