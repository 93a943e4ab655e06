//! Retry policy: bounded attempts with an exponentially growing cool-down.
//!
//! A failed work item becomes eligible again only after its cool-down has
//! elapsed; the delay doubles per attempt and is capped. Both the curve
//! parameters and the attempt bound are configuration, not constants, so
//! the engine can tune them per queue.

use chrono::Duration;

use crate::types::Timestamp;

/// Bounded-retry policy with exponential cool-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cool-down after the first failure.
    pub base: Duration,
    /// Upper bound on the cool-down regardless of attempt count.
    pub cap: Duration,
    /// Maximum total attempts before the item is finalized as failed.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Cool-down to apply after the `attempts`-th failure (1-based):
    /// `base * 2^(attempts - 1)`, capped.
    pub fn cool_down(&self, attempts: u32) -> Duration {
        if attempts <= 1 {
            return self.base.min(self.cap);
        }
        let exp = (attempts - 1).min(30);
        let factor = 1i32 << exp;
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Earliest instant the item may be claimed again after a failure at
    /// `failed_at` with the given (post-increment) attempt count.
    pub fn eligible_at(&self, failed_at: Timestamp, attempts: u32) -> Timestamp {
        failed_at + self.cool_down(attempts)
    }

    /// True when the (post-increment) attempt count exhausts the policy.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
