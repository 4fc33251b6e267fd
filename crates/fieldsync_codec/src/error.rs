//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// NaN and infinities have no canonical form.
    #[error("non-finite float has no canonical encoding")]
    NonFiniteFloat,

    /// A map holds the same key twice.
    #[error("duplicate map key {key:?}")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input continues after the top-level value.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },

    /// Indefinite-length items are not part of the format.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLength,

    /// A length prefix claims more than the decoder will allocate.
    #[error("length {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// The claimed length.
        claimed: u64,
        /// The enforced limit.
        max_allowed: u64,
    },

    /// Nesting deeper than the decoder accepts.
    #[error("nesting deeper than {max_depth} levels")]
    TooDeep {
        /// The enforced limit.
        max_depth: usize,
    },

    /// Structurally invalid input.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
