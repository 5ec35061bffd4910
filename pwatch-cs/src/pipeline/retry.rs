//! Per-document retry state machine
//!
//! The backoff is a pure function of the failed-attempt count and the base
//! delay: the wait before retry `k` is `base_delay * 2^k`.

use std::time::Duration;

/// Retry limits for throttled classification calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed per document
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before the retry that follows `failed_attempts` throttled calls
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempts))
    }
}

/// What to do after a throttled call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Exhausted,
}

/// Retry bookkeeping for one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Throttled calls so far
    attempt: u32,
    next_delay: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Throttled calls so far
    pub fn failed_attempts(&self) -> u32 {
        self.attempt
    }

    /// Calls made once the current one has returned
    pub fn attempts_made(&self) -> u32 {
        self.attempt + 1
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    /// Record a throttled call and decide whether to try again
    pub fn on_rate_limited(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.attempt += 1;
        if self.attempt < policy.max_retries {
            let delay = policy.backoff_delay(self.attempt);
            self.next_delay = Some(delay);
            RetryDecision::RetryAfter(delay)
        } else {
            self.next_delay = None;
            RetryDecision::Exhausted
        }
    }
}
