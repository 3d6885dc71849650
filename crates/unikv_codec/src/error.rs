//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while writing or reading a backup stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to encode a record.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Bytes in the stream are not a well-formed record.
    #[error("decoding failed: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// The stream ended in the middle of a record.
    #[error("backup stream truncated inside a record")]
    Truncated,

    /// A record's stored checksum does not match its contents.
    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u64,
        /// Checksum computed over the record's key and value.
        actual: u64,
    },
}

impl CodecError {
    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Returns true if this is a checksum mismatch.
    #[must_use]
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_display_is_hex() {
        let err = CodecError::ChecksumMismatch {
            expected: 0xAB,
            actual: 0xCD,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: expected 00000000000000ab, got 00000000000000cd"
        );
        assert!(err.is_checksum_mismatch());
        assert!(!CodecError::Truncated.is_checksum_mismatch());
    }
}
