//! Coordinator configuration.

use crate::error::{CoordinatorError, CoordinatorResult};
use rand::Rng;
use std::time::Duration;

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Deadline for each participant's `prepare` call. Expiry counts as a
    /// "no" vote.
    pub prepare_timeout: Duration,

    /// Deadline for each individual `commit`/`rollback` attempt. Expiry
    /// counts as a failed attempt and is retried.
    pub phase_two_timeout: Duration,

    /// Retry policy for `commit`/`rollback` calls.
    pub retry: RetryConfig,

    /// Whether to fsync the decision log on every append (safer but slower).
    /// When false, appends are still flushed to the OS.
    pub sync_on_write: bool,

    /// Whether `recover` compacts the log once it is done.
    pub compact_on_recovery: bool,

    /// How many terminal outcomes each registry shard remembers for
    /// idempotent duplicate calls.
    pub retired_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            prepare_timeout: Duration::from_secs(5),
            phase_two_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            sync_on_write: true,
            compact_on_recovery: true,
            retired_capacity: 1024,
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-call prepare timeout.
    #[must_use]
    pub const fn prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    /// Sets the per-attempt commit/rollback timeout.
    #[must_use]
    pub const fn phase_two_timeout(mut self, timeout: Duration) -> Self {
        self.phase_two_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether to fsync the log on every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether recovery compacts the log.
    #[must_use]
    pub const fn compact_on_recovery(mut self, value: bool) -> Self {
        self.compact_on_recovery = value;
        self
    }

    /// Sets the per-shard retired outcome capacity.
    #[must_use]
    pub const fn retired_capacity(mut self, capacity: usize) -> Self {
        self.retired_capacity = capacity;
        self
    }

    /// Checks that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero timeouts, zero retry attempts or an
    /// empty retired list.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.prepare_timeout.is_zero() {
            return Err(CoordinatorError::invalid_config("prepare_timeout must be non-zero"));
        }
        if self.phase_two_timeout.is_zero() {
            return Err(CoordinatorError::invalid_config(
                "phase_two_timeout must be non-zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoordinatorError::invalid_config(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.retired_capacity == 0 {
            return Err(CoordinatorError::invalid_config(
                "retired_capacity must be at least 1",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(CoordinatorError::invalid_config(
                "retry.backoff_multiplier must be >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Configuration for commit/rollback retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per participant (including the first).
    pub max_attempts: u32,
    /// Backoff base interval: the delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    ///
    /// Attempt 0 is the first call and has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
