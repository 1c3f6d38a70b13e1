//! Publish lifecycle: `PENDING -> PUBLISHING -> SENT | FAILED`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::outbox::backoff::BackoffPolicy;
use crate::outbox::claim::{Claim, ClaimToken};
use crate::outbox::types::PublishStatus;

/// Limits for publishing to the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Failed publishes after which the record is abandoned.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// How long a dispatcher's claim lasts before another may take over.
    pub lock_ttl: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff: BackoffPolicy::default(),
            lock_ttl: Duration::from_secs(120),
        }
    }
}

/// Publish columns of an outbox record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishState {
    pub status: PublishStatus,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub claim: Option<Claim>,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Default for PublishState {
    fn default() -> Self {
        Self {
            status: PublishStatus::Pending,
            attempts: 0,
            next_attempt_at: None,
            claim: None,
            last_error: None,
            published_at: None,
        }
    }
}

/// Result of finishing a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// FAILED, retried at `next_attempt_at`.
    Retry {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// FAILED with no further publish attempts scheduled.
    Abandoned { attempts: u32 },
    /// The caller's claim was taken over; nothing changed.
    StaleClaim,
}

/// Applies publish transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishLifecycle {
    policy: PublishPolicy,
}

impl PublishLifecycle {
    #[must_use]
    pub const fn new(policy: PublishPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    /// Returns true if a dispatcher may claim the record at `now`.
    ///
    /// PENDING and FAILED rows are claimable once their next attempt is due.
    /// PUBLISHING rows are claimable only once their claim has expired.
    #[must_use]
    pub fn is_claimable(state: &PublishState, now: DateTime<Utc>) -> bool {
        match state.status {
            PublishStatus::Pending => state.next_attempt_at.is_none_or(|at| at <= now),
            // FAILED with no next attempt has been abandoned.
            PublishStatus::Failed => state.next_attempt_at.is_some_and(|at| at <= now),
            PublishStatus::Publishing => state.claim.is_none_or(|c| c.is_expired(now)),
            PublishStatus::Sent => false,
        }
    }

    /// Claims the record for publishing, or returns `None` if not claimable.
    pub fn claim(&self, state: &mut PublishState, now: DateTime<Utc>) -> Option<ClaimToken> {
        if !Self::is_claimable(state, now) {
            return None;
        }
        let claim = Claim::acquire(now, self.policy.lock_ttl);
        state.status = PublishStatus::Publishing;
        state.claim = Some(claim);
        Some(claim.token)
    }

    /// Records an acknowledged publish.
    pub fn on_sent(
        &self,
        state: &mut PublishState,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> PublishOutcome {
        if !Self::holds(state, token) {
            return PublishOutcome::StaleClaim;
        }
        state.status = PublishStatus::Sent;
        state.published_at = Some(now);
        state.next_attempt_at = None;
        state.claim = None;
        state.last_error = None;
        PublishOutcome::Sent
    }

    /// Records a failed publish and releases the claim.
    pub fn on_failed(
        &self,
        state: &mut PublishState,
        token: ClaimToken,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> PublishOutcome {
        if !Self::holds(state, token) {
            return PublishOutcome::StaleClaim;
        }
        state.attempts = state.attempts.saturating_add(1);
        state.status = PublishStatus::Failed;
        state.claim = None;
        state.last_error = Some(error.into());

        if state.attempts >= self.policy.max_attempts {
            state.next_attempt_at = None;
            return PublishOutcome::Abandoned {
                attempts: state.attempts,
            };
        }

        let next = self.policy.backoff.next_attempt_at(now, state.attempts);
        state.next_attempt_at = Some(next);
        PublishOutcome::Retry {
            attempt: state.attempts,
            next_attempt_at: next,
        }
    }

    fn holds(state: &PublishState, token: ClaimToken) -> bool {
        state.status == PublishStatus::Publishing
            && state.claim.is_some_and(|c| c.is_held_by(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_pending_row_is_claimed_and_sent() {
        let lifecycle = PublishLifecycle::default();
        let mut state = PublishState::default();
        let now = Utc::now();

        let token = lifecycle.claim(&mut state, now).unwrap();
        assert_eq!(state.status, PublishStatus::Publishing);
        assert!(lifecycle.claim(&mut state, now).is_none());

        assert_eq!(lifecycle.on_sent(&mut state, token, now), PublishOutcome::Sent);
        assert_eq!(state.status, PublishStatus::Sent);
        assert_eq!(state.published_at, Some(now));
        assert!(state.claim.is_none());
    }

    #[test]
    fn test_failure_backs_off_then_becomes_claimable() {
        let lifecycle = PublishLifecycle::default();
        let mut state = PublishState::default();
        let now = Utc::now();

        let token = lifecycle.claim(&mut state, now).unwrap();
        let outcome = lifecycle.on_failed(&mut state, token, now, "503");
        assert_eq!(
            outcome,
            PublishOutcome::Retry {
                attempt: 1,
                next_attempt_at: now + TimeDelta::seconds(5),
            }
        );
        assert_eq!(state.status, PublishStatus::Failed);
        assert!(!PublishLifecycle::is_claimable(&state, now));
        assert!(PublishLifecycle::is_claimable(&state, now + TimeDelta::seconds(5)));
    }

    #[test]
    fn test_stale_claim_is_reclaimed_and_old_token_ignored() {
        let lifecycle = PublishLifecycle::default();
        let mut state = PublishState::default();
        let now = Utc::now();

        let first = lifecycle.claim(&mut state, now).unwrap();
        let later = now + TimeDelta::seconds(121);
        let second = lifecycle.claim(&mut state, later).unwrap();
        assert_ne!(first, second);

        assert_eq!(lifecycle.on_sent(&mut state, first, later), PublishOutcome::StaleClaim);
        assert_eq!(state.status, PublishStatus::Publishing);
        assert_eq!(lifecycle.on_sent(&mut state, second, later), PublishOutcome::Sent);
    }

    #[test]
    fn test_abandoned_after_max_attempts() {
        let lifecycle = PublishLifecycle::new(PublishPolicy {
            max_attempts: 2,
            ..PublishPolicy::default()
        });
        let mut state = PublishState::default();
        let mut now = Utc::now();

        let token = lifecycle.claim(&mut state, now).unwrap();
        lifecycle.on_failed(&mut state, token, now, "timeout");
        now += TimeDelta::seconds(5);
        let token = lifecycle.claim(&mut state, now).unwrap();
        assert_eq!(
            lifecycle.on_failed(&mut state, token, now, "timeout"),
            PublishOutcome::Abandoned { attempts: 2 }
        );
        assert_eq!(state.next_attempt_at, None);
        assert!(!PublishLifecycle::is_claimable(&state, now + TimeDelta::days(1)));
    }

    #[test]
    fn test_sent_is_never_claimable() {
        let state = PublishState {
            status: PublishStatus::Sent,
            ..PublishState::default()
        };
        assert!(!PublishLifecycle::is_claimable(&state, Utc::now()));
    }
}
