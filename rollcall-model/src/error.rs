use rollcall_sync::{ConflictCase, SyncError};
use thiserror::Error;

/// Result type for domain service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by domain services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("record encoding error: {0}")]
    Encoding(#[from] rollcall_types::Error),

    /// Rejected by the record type's own validation. Nothing was written.
    #[error("invalid {collection} record: {reason}")]
    Invalid {
        collection: &'static str,
        reason: String,
    },
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sync(err) if err.is_retryable())
    }

    pub fn conflict(&self) -> Option<&ConflictCase> {
        match self {
            Self::Sync(err) => err.conflict(),
            _ => None,
        }
    }

    pub fn into_conflict(self) -> Option<ConflictCase> {
        match self {
            Self::Sync(err) => err.into_conflict(),
            _ => None,
        }
    }
}
