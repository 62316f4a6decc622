use portal_db::StoreError;
use portal_executor::ExecError;

/// Domain-level failures, mapped onto stable API codes by the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("session expired")]
    SessionExpired,

    #[error("authentication required")]
    Unauthorized,

    #[error("insufficient privileges")]
    Forbidden,

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("storage error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => DomainError::NotFound("resource"),
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::Database(msg) => DomainError::Store(msg),
        }
    }
}
