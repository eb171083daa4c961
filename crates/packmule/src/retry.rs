//! Shared retry utilities for upstream operations.
//!
//! Registry fetches, queue deliveries and database writes all use the same
//! exponential-backoff configuration. Whether a failed operation is retried
//! at all is decided by the caller from the typed outcome of the operation
//! (see [`crate::registry::FetchOutcome`]), never by inspecting error text.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Default initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Default maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default maximum retry attempts for a single operation.
pub const MAX_RETRIES: u32 = 8;

/// Configuration for retry operations.
///
/// The defaults are deployment configuration, not load-bearing constants:
/// every component that retries accepts a `RetryConfig` so operators can
/// tune reconnect behavior without rebuilding.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES as usize,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }

    /// The delay before attempt `n` (0-based), ignoring jitter.
    ///
    /// Used by components that manage their own retry loop (the change feed,
    /// the in-memory queue) rather than going through `backon`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = self
            .min_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        doubled.min(self.max_delay)
    }
}

/// Build the default exponential backoff strategy for registry operations.
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    RetryConfig::default().into_backoff()
}
