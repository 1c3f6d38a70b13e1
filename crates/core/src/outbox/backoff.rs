//! Exponential backoff between attempts.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// `delay(a) = min(base * 2^(a-1), cap)` for `a >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Creates a policy. A cap below the base is raised to the base.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    /// Creates a policy from whole seconds.
    #[must_use]
    pub fn from_secs(base_secs: u64, cap_secs: u64) -> Self {
        Self::new(Duration::from_secs(base_secs), Duration::from_secs(cap_secs))
    }

    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the attempt following failure number `attempt`.
    ///
    /// Attempt 0 is treated as 1.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Absolute time of the next attempt.
    #[must_use]
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = TimeDelta::from_std(self.delay(attempt)).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for BackoffPolicy {
    /// 5 seconds, capped at 10 minutes.
    fn default() -> Self {
        Self::from_secs(5, 600)
    }
}
