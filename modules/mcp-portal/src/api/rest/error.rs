//! Domain → HTTP error mapping with stable machine-readable codes.

use axum::http::StatusCode;
use serde::Serialize;

use portal_executor::ExecError;

use crate::domain::DomainError;

/// Wire-stable error body inside the response envelope.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

/// An error ready for the envelope: HTTP status plus stable code.
#[derive(Clone, Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_owned(),
                message: message.into(),
                details: None,
            },
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.body.details = Some(details);
        self
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "authentication required",
        )
    }

    #[must_use]
    pub fn session_expired() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "SESSION_EXPIRED",
            "session expired, log in again",
        )
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(what) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{what} not found"),
            ),
            DomainError::SessionExpired => Self::session_expired(),
            DomainError::Unauthorized => Self::unauthorized(),
            DomainError::Forbidden => Self::new(
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_PRIVILEGES",
                "insufficient privileges for this operation",
            ),
            DomainError::Validation { field, message } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                message,
            )
            .with_details(serde_json::json!({ "field": field })),
            DomainError::Conflict(message) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            DomainError::Exec(exec) => from_exec(exec),
            DomainError::Store(detail) | DomainError::Internal(detail) => {
                // Opaque to the caller; the detail goes to the log only.
                tracing::error!(error = %detail, "internal error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error",
                )
            }
        }
    }
}

fn from_exec(e: ExecError) -> ApiError {
    match e {
        ExecError::Validation(finding) => ApiError::new(
            StatusCode::BAD_REQUEST,
            finding.code.as_str(),
            finding.message.clone(),
        )
        .with_details(serde_json::json!({ "field": finding.field })),
        ExecError::RateLimited(detail) => ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            detail.to_string(),
        )
        .with_details(serde_json::json!({
            "limit": detail.limit,
            "reset_at": detail.reset_at,
            "retry_after_secs": detail.retry_after.as_secs(),
            "blocked": detail.blocked,
        })),
        ExecError::Timeout {
            configured,
            elapsed,
        } => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            "command timed out",
        )
        .with_details(serde_json::json!({
            "configured_secs": configured.as_secs_f64(),
            "elapsed_secs": elapsed.as_secs_f64(),
        })),
        ExecError::Cancelled => ApiError::new(
            StatusCode::REQUEST_TIMEOUT,
            "CANCELLED",
            "request cancelled",
        ),
        ExecError::Internal(detail) => {
            tracing::error!(error = %detail, "executor internal error");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal error",
            )
        }
    }
}
