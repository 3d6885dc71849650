//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced through the backend contract.
///
/// Backends map their own failures onto these variants. Anything that is not
/// one of the named conditions travels as [`KvError::Backend`] unchanged.
#[derive(Debug, Error)]
pub enum KvError {
    /// Caller misuse: empty key, malformed range, bad argument.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// The key does not exist.
    #[error("key not found")]
    NotFound,

    /// The snapshot or transaction was already discarded, committed or
    /// rolled back.
    #[error("already closed")]
    AlreadyClosed,

    /// Optimistic concurrency check failed at commit. Nothing was applied.
    #[error("transaction conflict{}", describe_key(.key))]
    Conflict {
        /// The first conflicting key, when the backend knows it.
        key: Option<Vec<u8>>,
    },

    /// The context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Reading a value stream or another local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opaque backend or transport failure.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A commit was sent but its outcome could not be confirmed before the
    /// context ended. The commit may or may not have been applied.
    #[error("commit outcome unconfirmed: {message}")]
    CommitUnconfirmed {
        /// Why confirmation stopped.
        message: String,
    },
}

fn describe_key(key: &Option<Vec<u8>>) -> String {
    match key {
        Some(key) => format!(" on key {:?}", String::from_utf8_lossy(key)),
        None => String::new(),
    }
}

impl KvError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a conflict error naming the key.
    pub fn conflict(key: impl Into<Vec<u8>>) -> Self {
        Self::Conflict {
            key: Some(key.into()),
        }
    }

    /// Wraps a backend specific error.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }

    /// Creates a commit unconfirmed error.
    pub fn commit_unconfirmed(message: impl Into<String>) -> Self {
        Self::CommitUnconfirmed {
            message: message.into(),
        }
    }

    /// Returns true for [`KvError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true for [`KvError::InvalidArgument`].
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns true for [`KvError::AlreadyClosed`].
    #[must_use]
    pub fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed)
    }

    /// Returns true for [`KvError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns true if rerunning the whole unit of work may succeed.
    ///
    /// Only conflicts qualify. The retry must start from a fresh
    /// transaction, never resume the failed one.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_names_key() {
        assert_eq!(
            KvError::conflict(b"user/7".to_vec()).to_string(),
            "transaction conflict on key \"user/7\""
        );
        assert_eq!(
            KvError::Conflict { key: None }.to_string(),
            "transaction conflict"
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(KvError::conflict(b"k".to_vec()).is_retryable());
        assert!(!KvError::NotFound.is_retryable());
        assert!(!KvError::Cancelled.is_retryable());
        assert!(!KvError::backend("connection reset").is_retryable());
        assert!(!KvError::commit_unconfirmed("gave up").is_retryable());
    }

    #[test]
    fn cancellation_predicates() {
        assert!(KvError::Cancelled.is_cancelled());
        assert!(KvError::DeadlineExceeded.is_cancelled());
        assert!(!KvError::AlreadyClosed.is_cancelled());
    }

    #[test]
    fn backend_error_keeps_source() {
        let err = KvError::backend(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk on fire"));
    }
}
