//! Error types for unikv core.

use thiserror::Error;
use unikv_codec::CodecError;
use unikv_storage::KvError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in bulk and typed operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error reported by the backend.
    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    /// Error reading or writing a backup stream.
    #[error("backup stream error: {0}")]
    Codec(#[from] CodecError),

    /// Caller misuse such as a negative chunk size.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A stored value could not be encoded or decoded as the requested type.
    #[error("value at key {:?}: {message}", String::from_utf8_lossy(.key))]
    Value {
        /// Key holding the value.
        key: Vec<u8>,
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a value error for `key`.
    pub fn value(key: &[u8], message: impl Into<String>) -> Self {
        Self::Value {
            key: key.to_vec(),
            message: message.into(),
        }
    }

    /// Returns true if a backup record failed checksum verification.
    #[must_use]
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, Self::Codec(err) if err.is_checksum_mismatch())
    }

    /// Returns true if a key was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_not_found())
    }

    /// Returns true if a commit failed its conflict check.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_conflict())
    }

    /// Returns true for caller misuse at either layer.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::InvalidArgument { .. } => true,
            Self::Storage(err) => err.is_invalid_argument(),
            _ => false,
        }
    }

    /// Returns true if the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_cancelled())
    }
}
