//! Error types for FieldSync core.

use crate::record::RecordId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the record log and durable store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] fieldsync_storage::StorageError),

    /// Payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] fieldsync_codec::CodecError),

    /// A log frame failed its CRC check.
    #[error("log frame at offset {offset} failed CRC: stored {stored:08x}, computed {computed:08x}")]
    FrameChecksum {
        /// Offset of the damaged frame.
        offset: u64,
        /// CRC stored in the frame.
        stored: u32,
        /// CRC computed over the frame.
        computed: u32,
    },

    /// The log is structurally damaged.
    #[error("log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// No record with this id.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The missing id.
        id: RecordId,
    },

    /// A write would move a record's version backwards.
    #[error("version regression for {id}: stored {stored}, attempted {attempted}")]
    VersionRegression {
        /// The record id.
        id: RecordId,
        /// Version currently stored.
        stored: u64,
        /// Version of the rejected write.
        attempted: u64,
    },

    /// A record or one of its fields is malformed.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}
