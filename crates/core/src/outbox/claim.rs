//! Claim tokens that stop two workers from handling the same row.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Random token written to a row when it is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(pub Uuid);

impl ClaimToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A claim with an expiry. Expired claims may be taken over by another worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub token: ClaimToken,
    pub locked_until: DateTime<Utc>,
}

impl Claim {
    /// Takes a fresh claim lasting `ttl` from `now`.
    #[must_use]
    pub fn acquire(now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self {
            token: ClaimToken::new(),
            locked_until: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.locked_until
    }

    /// Returns true if `token` still owns this claim.
    #[must_use]
    pub fn is_held_by(&self, token: ClaimToken) -> bool {
        self.token == token
    }
}
