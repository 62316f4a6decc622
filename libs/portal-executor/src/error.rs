use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitExceeded;

/// Stable machine-readable validation codes surfaced to API clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    CommandNotWhitelisted,
    InsufficientPrivileges,
    DangerousPattern,
    RequiredArgMissing,
    ForbiddenArgUsed,
    ValidationError,
}

impl ValidationCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::CommandNotWhitelisted => "COMMAND_NOT_WHITELISTED",
            ValidationCode::InsufficientPrivileges => "INSUFFICIENT_PRIVILEGES",
            ValidationCode::DangerousPattern => "DANGEROUS_PATTERN",
            ValidationCode::RequiredArgMissing => "REQUIRED_ARG_MISSING",
            ValidationCode::ForbiddenArgUsed => "FORBIDDEN_ARG_USED",
            ValidationCode::ValidationError => "VALIDATION_ERROR",
        }
    }
}

/// One validation finding. `field` names the offending argument position;
/// the message never echoes dangerous content back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub code: ValidationCode,
    pub field: String,
    pub message: String,
}

impl ValidationFinding {
    #[must_use]
    pub fn new(code: ValidationCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code.as_str(), self.field, self.message)
    }
}

/// Category tag recorded in the result envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    Validation,
    RateLimited,
    Timeout,
    SpawnFailed,
    NonZeroExit,
    Cancelled,
    Internal,
}

impl ExecErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecErrorKind::Validation => "validation",
            ExecErrorKind::RateLimited => "rate_limited",
            ExecErrorKind::Timeout => "timeout",
            ExecErrorKind::SpawnFailed => "spawn_failed",
            ExecErrorKind::NonZeroExit => "non_zero_exit",
            ExecErrorKind::Cancelled => "cancelled",
            ExecErrorKind::Internal => "internal",
        }
    }
}

/// Executor failure taxonomy. Validation and rate-limit rejections happen
/// before any child exists; timeout and cancellation abort a running child;
/// spawn failures and non-zero exits are captured in the result envelope
/// instead (see [`crate::ExecResult`]).
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command validation failed: {0}")]
    Validation(ValidationFinding),

    #[error("rate limit exceeded: {0}")]
    RateLimited(RateLimitExceeded),

    #[error("command timed out after {elapsed:?} (configured {configured:?})")]
    Timeout {
        configured: Duration,
        elapsed: Duration,
    },

    #[error("command cancelled by caller")]
    Cancelled,

    #[error("internal executor error: {0}")]
    Internal(String),
}

impl ExecError {
    #[must_use]
    pub fn kind(&self) -> ExecErrorKind {
        match self {
            ExecError::Validation(_) => ExecErrorKind::Validation,
            ExecError::RateLimited(_) => ExecErrorKind::RateLimited,
            ExecError::Timeout { .. } => ExecErrorKind::Timeout,
            ExecError::Cancelled => ExecErrorKind::Cancelled,
            ExecError::Internal(_) => ExecErrorKind::Internal,
        }
    }
}
