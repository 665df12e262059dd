//! Crash-retry backoff policy for recording sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Delay applied after the `attempt`-th failure (1-based).
    ///
    /// Strict doubling from `initial_backoff`, clamped to `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let mut delay = self.initial_backoff.min(self.max_backoff);
        for _ in 1..attempt {
            delay = delay.saturating_mul(2).min(self.max_backoff);
            if delay == self.max_backoff {
                break;
            }
        }
        delay
    }

    /// Check if another attempt is allowed after `failures` failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }
}

/// Per-session retry bookkeeping.
///
/// The counter only resets when a new session (and thus a new `RetryState`)
/// starts; long healthy runs do not reset it.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    failures: u32,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record an unplanned exit.
    ///
    /// Returns the delay to sleep before the next attempt, or `None` once the
    /// failure count exceeds `max_retries` and the session must be abandoned.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if !self.config.should_retry(self.failures) {
            return None;
        }
        Some(self.config.delay_for_attempt(self.failures))
    }

    /// Failures recorded so far in this session.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
