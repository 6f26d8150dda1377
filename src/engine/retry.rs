// src/engine/retry.rs
//! Bounded fixed-delay retry decisions for transient fetch failures.
//!
//! The delay is deliberately fixed rather than exponential: consumers
//! assert on the timing, so it is part of the observable contract.

use std::time::Duration;

/// Pure retry policy: whether to retry, and how long to wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    /// Whether a failure at `attempt_index` (0 = first retry candidate)
    /// should be retried given a budget of `max_retries`.
    pub fn should_retry(self, attempt_index: u32, max_retries: u32) -> bool {
        attempt_index < max_retries
    }

    /// Delay before the given retry attempt. Fixed: every attempt
    /// waits the same base delay.
    pub fn delay_for(self, _attempt_index: u32, base_delay: Duration) -> Duration {
        base_delay
    }
}
