//! Shared backoff policy for transient-failure retries.
//!
//! Every retry site in the tick loop waits through this one policy, so the
//! recovery cadence is consistent and testable.

use std::time::Duration;

/// Exponential backoff with a hard cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Growth factor applied per additional consecutive failure.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            multiplier: 2,
            cap: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: u32, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// Delay to wait after `consecutive_failures` failures in a row.
    ///
    /// Zero failures means no delay. The curve is `base * multiplier^(n-1)`,
    /// saturating at `cap`.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let mut delay = self.base;
        for _ in 1..consecutive_failures {
            delay = delay.saturating_mul(self.multiplier);
            if delay >= self.cap {
                return self.cap;
            }
        }
        delay.min(self.cap)
    }
}
