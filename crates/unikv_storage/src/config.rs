//! Configuration for backends and adapters.

use std::time::Duration;

/// Configuration for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Prune versions no live snapshot or transaction can see on every
    /// commit.
    pub gc_on_commit: bool,

    /// Include ranges scanned by a transaction in its commit-time conflict
    /// check. When false only keys that were written, fetched or yielded by
    /// an iterator are checked.
    pub track_range_reads: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            gc_on_commit: true,
            track_range_reads: true,
        }
    }
}

impl MemoryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits prune unreachable versions.
    #[must_use]
    pub const fn gc_on_commit(mut self, value: bool) -> Self {
        self.gc_on_commit = value;
        self
    }

    /// Sets whether scanned ranges take part in conflict detection.
    #[must_use]
    pub const fn track_range_reads(mut self, value: bool) -> Self {
        self.track_range_reads = value;
        self
    }
}

/// Backoff schedule for confirming commits whose outcome is unknown.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of confirmation probes. Zero means no limit other
    /// than the context.
    pub max_attempts: u32,
    /// Delay before the first probe.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a configuration allowing `max_attempts` probes.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Probes until the outcome is known or the context ends.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before probe number `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Returns true if probe number `attempt` is allowed.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}
