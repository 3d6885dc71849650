//! Configuration for bulk operations.

use crate::error::{CoreError, CoreResult};

/// Default number of records per transaction for chunked operations.
pub const DEFAULT_MAX_PER_TX: i64 = 1000;

/// Configuration for [`restore_with_config`](crate::restore_with_config) and
/// [`clear_with_config`](crate::clear_with_config).
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Maximum number of records written or deleted per transaction. Zero
    /// puts everything in a single transaction; negative values are invalid.
    pub max_per_tx: i64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_per_tx: DEFAULT_MAX_PER_TX,
        }
    }
}

impl BulkConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn max_per_tx(mut self, max_per_tx: i64) -> Self {
        self.max_per_tx = max_per_tx;
        self
    }

    /// Puts every record in a single transaction.
    #[must_use]
    pub const fn unbounded(self) -> Self {
        self.max_per_tx(0)
    }

    /// Records allowed in one chunk.
    pub(crate) fn chunk_limit(&self) -> CoreResult<usize> {
        chunk_limit(self.max_per_tx)
    }
}

/// Converts a caller's `max_per_tx` into a per-chunk record limit.
pub(crate) fn chunk_limit(max_per_tx: i64) -> CoreResult<usize> {
    match max_per_tx {
        0 => Ok(usize::MAX),
        n if n < 0 => Err(CoreError::invalid_argument(format!(
            "max_per_tx must not be negative, got {n}"
        ))),
        n => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        assert_eq!(BulkConfig::default().max_per_tx, DEFAULT_MAX_PER_TX);
        assert_eq!(BulkConfig::new().max_per_tx(5).max_per_tx, 5);
        assert_eq!(BulkConfig::new().unbounded().chunk_limit().unwrap(), usize::MAX);
    }

    #[test]
    fn limits() {
        assert_eq!(chunk_limit(0).unwrap(), usize::MAX);
        assert_eq!(chunk_limit(1).unwrap(), 1);
        assert_eq!(chunk_limit(250).unwrap(), 250);
        assert!(chunk_limit(-1).unwrap_err().is_invalid_argument());
        assert!(chunk_limit(i64::MIN).unwrap_err().is_invalid_argument());
    }
}
