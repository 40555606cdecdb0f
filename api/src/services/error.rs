//! Error handling utilities for route handlers and services

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use tracing::{error, warn};

use crate::services::recorder::RecordError;

/// An action the anti-abuse pipeline refused. Expected and user-facing:
/// it is audited, never logged as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
    /// Milliseconds the client should wait before retrying
    pub cooldown_remaining_ms: Option<i64>,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            cooldown_remaining_ms: None,
        }
    }

    pub fn with_cooldown(mut self, remaining_ms: i64) -> Self {
        self.cooldown_remaining_ms = Some(remaining_ms.max(1));
        self
    }
}

/// Error type returned by JSON handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(Rejection),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Rejected(rejection) => ApiError::Rejected(rejection),
            RecordError::UserNotFound(_) => ApiError::NotFound("user"),
            RecordError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Rejected(rejection) => {
                let mut body = json!({
                    "error": rejection.reason,
                    "valid": false,
                    "reason": rejection.reason,
                });
                if let Some(remaining) = rejection.cooldown_remaining_ms {
                    body["cooldownRemaining"] = json!(remaining);
                }
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{} not found", what) })),
            )
                .into_response(),
            ApiError::Internal(detail) => {
                error!(%detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Extension trait for logging errors and converting to StatusCode
pub trait LogErr<T> {
    /// Log error with context and return INTERNAL_SERVER_ERROR
    fn log_500(self, context: &str) -> Result<T, StatusCode>;
}

impl<T, E: Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.map_err(|e| {
            error!(error = %e, "{}", context);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Run a secondary write whose failure must not reach the caller.
/// Failures are logged; `None` tells the caller the write did not happen.
pub async fn best_effort<T, E, F>(context: &str, write: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match write.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "{} failed, continuing", context);
            None
        }
    }
}
