//! Caller-side retry policy.
//!
//! The engine never resubmits failed work on its own. A caller that wants
//! retries asks `Scheduler::retry_failed` with one of these, between runs.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed per task, the first one included.
    pub max_attempts: u32,

    /// Delay before the first retry round.
    pub base_delay: Duration,

    /// Backoff multiplier for later rounds.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
        }
    }

    /// Whether a task that failed on attempt `attempt` gets another go.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry round `round` (1-indexed):
    /// `base_delay * multiplier^(round - 1)`, saturating at `Duration::MAX`.
    pub fn next_delay(&self, round: u32) -> Duration {
        let exponent = i32::try_from(round.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(if delay_secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::never()
    }
}
