//! Error types for the sync engine.

use fieldsync_core::{CoreError, CorruptionKind, RecordId};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while saving, syncing or reviewing records.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A record failed integrity verification.
    #[error("integrity failure for {id}: {kind}")]
    Integrity {
        /// The damaged record.
        id: RecordId,
        /// What is wrong with it.
        kind: CorruptionKind,
    },

    /// The remote reported a version conflict.
    #[error("version conflict for {id}")]
    Conflict {
        /// The conflicting record.
        id: RecordId,
    },

    /// Network or remote failure.
    #[error("transient failure: {message}")]
    Transient {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote call did not finish in time.
    #[error("remote call timed out")]
    Timeout,

    /// The durable store failed.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// A payload handed to `save` has no canonical form.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Why the payload was rejected.
        message: String,
    },

    /// No record with this id.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The missing id.
        id: RecordId,
    },

    /// The record is not held for manual review.
    #[error("record {id} is not in manual review")]
    NotInReview {
        /// The id that was looked up.
        id: RecordId,
    },
}

/// Closed classification of per-record failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Checksum, missing payload or unparseable payload.
    Integrity,
    /// Version conflict with the remote.
    Conflict,
    /// Network, remote or timeout failure.
    Transient,
    /// Durable store failure.
    Storage,
}

impl ErrorKind {
    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Integrity => "integrity",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    /// Creates a retryable transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a transient error that will not clear by retrying.
    pub fn transient_fatal(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transient { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Integrity { .. } | SyncError::InvalidPayload { .. } => ErrorKind::Integrity,
            SyncError::Conflict { .. } => ErrorKind::Conflict,
            SyncError::Transient { .. } | SyncError::Timeout => ErrorKind::Transient,
            SyncError::Storage(_)
            | SyncError::RecordNotFound { .. }
            | SyncError::NotInReview { .. } => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transient("connection reset").is_retryable());
        assert!(!SyncError::transient_fatal("bad certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Conflict { id: RecordId::new() }.is_retryable());
    }

    #[test]
    fn kinds() {
        let id = RecordId::new();
        assert_eq!(SyncError::Timeout.kind(), ErrorKind::Transient);
        assert_eq!(
            SyncError::Integrity {
                id,
                kind: CorruptionKind::MissingPayload
            }
            .kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            SyncError::from(CoreError::RecordNotFound { id }).kind(),
            ErrorKind::Storage
        );
        assert_eq!(ErrorKind::Conflict.to_string(), "conflict");
    }

    #[test]
    fn display() {
        let err = SyncError::transient("socket closed");
        assert_eq!(err.to_string(), "transient failure: socket closed");
    }
}
