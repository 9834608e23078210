//! Error types for the sync layer.

use crate::conflict::ConflictCase;
use rollcall_types::{Record, RecordId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced to callers of the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The record does not exist remotely.
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: RecordId },

    /// The caller's observed version is behind the remote version.
    /// Requires an explicit resolution; never resolved automatically.
    #[error("version conflict: {0}")]
    Conflict(Box<ConflictCase>),

    /// Transient write failure. Optimistic cache state has been rolled back.
    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),

    /// Transient read failure.
    #[error("remote read failed: {0}")]
    RemoteReadFailed(String),

    /// Denied by the auth collaborator or the remote store.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A record could not be encoded or decoded.
    #[error("record encoding error: {0}")]
    Encoding(#[from] rollcall_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything uncategorized. Not retryable.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SyncError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteWriteFailed(_) | Self::RemoteReadFailed(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Borrows the conflict case, if this is a conflict.
    pub fn conflict(&self) -> Option<&ConflictCase> {
        match self {
            Self::Conflict(case) => Some(case),
            _ => None,
        }
    }

    /// Takes the conflict case, if this is a conflict.
    pub fn into_conflict(self) -> Option<ConflictCase> {
        match self {
            Self::Conflict(case) => Some(*case),
            _ => None,
        }
    }

    pub(crate) fn not_found(collection: &str, id: &RecordId) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.clone(),
        }
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures reported by a [`RemoteStore`](crate::RemoteStore) implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Network or backend unavailable.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time.
    #[error("remote call timed out")]
    Timeout,

    /// Rejected by the store's security rules.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The addressed record does not exist.
    #[error("not found")]
    NotFound,

    /// A conditional update found a different version. Carries the full
    /// current remote record.
    #[error("version mismatch, remote is at {}", .current.version)]
    VersionMismatch { current: Box<Record> },

    /// Uncategorized backend failure.
    #[error("{0}")]
    Other(String),
}
