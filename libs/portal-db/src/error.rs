use sea_orm::DbErr;

/// Storage-layer failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row does not exist, or is invisible to the calling scope.
    /// Deliberately indistinguishable, to avoid existence probes.
    #[error("not found")]
    NotFound,

    /// A uniqueness rule was violated (duplicate catalog name, duplicate
    /// customization target, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Conflicts are worth retrying inside
    /// [`crate::DbHandle::transaction_with_retry`]; the rest are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        match &e {
            DbErr::RecordNotFound(_) => StoreError::NotFound,
            DbErr::Query(runtime) | DbErr::Exec(runtime) => {
                let msg = runtime.to_string();
                // Unique-constraint violations surface as conflicts so the
                // transaction layer can retry or the caller can report them.
                if msg.to_ascii_lowercase().contains("unique") {
                    StoreError::Conflict(msg)
                } else {
                    StoreError::Database(msg)
                }
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}
