//! Retry / DEAD-letter control for the processing lifecycle.

use chrono::{DateTime, Utc};

use crate::outbox::backoff::BackoffPolicy;
use crate::outbox::types::ProcessingStatus;

/// Attempt limit and backoff for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which a record is DEAD.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Processing columns of an outbox record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingState {
    /// `None` means the record has never been picked up.
    pub status: Option<ProcessingStatus>,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProcessingState {
    /// Returns true once SUCCEEDED or DEAD.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(ProcessingStatus::is_terminal)
    }

    /// Returns true if a processor may pick the record up at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.is_processed || self.is_terminal() {
            return false;
        }
        self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Result of recording a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOutcome {
    /// The record is now SUCCEEDED.
    Succeeded,
    /// The record was already terminal; nothing changed.
    AlreadyTerminal(ProcessingStatus),
}

/// Result of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// FAILED, retried at `next_attempt_at`.
    Retry {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Attempts exhausted; the record is DEAD.
    Dead { attempts: u32 },
    /// The record was already terminal; nothing changed.
    AlreadyTerminal(ProcessingStatus),
}

/// Applies processing transitions. SUCCEEDED and DEAD are never left.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records a successful posting (or a duplicate).
    pub fn on_success(&self, state: &mut ProcessingState, now: DateTime<Utc>) -> SuccessOutcome {
        if let Some(status) = state.status.filter(|s| s.is_terminal()) {
            return SuccessOutcome::AlreadyTerminal(status);
        }
        state.status = Some(ProcessingStatus::Succeeded);
        state.is_processed = true;
        state.processed_at = Some(now);
        state.next_attempt_at = None;
        state.last_error = None;
        SuccessOutcome::Succeeded
    }

    /// Records a permanent drop: malformed input or a posting-gate rejection.
    ///
    /// The record is acknowledged as SUCCEEDED with the reason kept in
    /// `last_error`; it is never retried.
    pub fn on_drop(
        &self,
        state: &mut ProcessingState,
        now: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> SuccessOutcome {
        if let Some(status) = state.status.filter(|s| s.is_terminal()) {
            return SuccessOutcome::AlreadyTerminal(status);
        }
        state.status = Some(ProcessingStatus::Succeeded);
        state.is_processed = true;
        state.processed_at = Some(now);
        state.next_attempt_at = None;
        state.last_error = Some(reason.into());
        SuccessOutcome::Succeeded
    }

    /// Records a failed attempt.
    pub fn on_failure(
        &self,
        state: &mut ProcessingState,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> FailureOutcome {
        if let Some(status) = state.status.filter(|s| s.is_terminal()) {
            return FailureOutcome::AlreadyTerminal(status);
        }
        state.attempts = state.attempts.saturating_add(1);
        state.last_error = Some(error.into());

        if state.attempts >= self.policy.max_attempts {
            Self::kill(state, now);
            return FailureOutcome::Dead {
                attempts: state.attempts,
            };
        }

        let next = self.policy.backoff.next_attempt_at(now, state.attempts);
        state.status = Some(ProcessingStatus::Failed);
        state.next_attempt_at = Some(next);
        FailureOutcome::Retry {
            attempt: state.attempts,
            next_attempt_at: next,
        }
    }

    /// Moves a record straight to DEAD, e.g. when its idempotency key
    /// already exhausted its retries on another path.
    pub fn on_exhausted(
        &self,
        state: &mut ProcessingState,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> FailureOutcome {
        if let Some(status) = state.status.filter(|s| s.is_terminal()) {
            return FailureOutcome::AlreadyTerminal(status);
        }
        state.attempts = state.attempts.max(self.policy.max_attempts);
        state.last_error = Some(error.into());
        Self::kill(state, now);
        FailureOutcome::Dead {
            attempts: state.attempts,
        }
    }

    fn kill(state: &mut ProcessingState, now: DateTime<Utc>) {
        state.status = Some(ProcessingStatus::Dead);
        state.next_attempt_at = None;
        state.is_processed = true;
        state.processed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_failure_schedules_backoff() {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        let now = Utc::now();

        let outcome = controller.on_failure(&mut state, now, "deadlock detected");

        assert_eq!(
            outcome,
            FailureOutcome::Retry {
                attempt: 1,
                next_attempt_at: now + TimeDelta::seconds(5),
            }
        );
        assert_eq!(state.status, Some(ProcessingStatus::Failed));
        assert_eq!(state.last_error.as_deref(), Some("deadlock detected"));
        assert!(!state.is_processed);
        assert!(!state.is_due(now));
        assert!(state.is_due(now + TimeDelta::seconds(5)));
    }

    #[test]
    fn test_dead_exactly_at_tenth_attempt() {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        let now = Utc::now();

        for attempt in 1..10 {
            let outcome = controller.on_failure(&mut state, now, "boom");
            assert!(matches!(outcome, FailureOutcome::Retry { attempt: a, .. } if a == attempt));
            assert_eq!(state.status, Some(ProcessingStatus::Failed));
        }

        let outcome = controller.on_failure(&mut state, now, "boom");
        assert_eq!(outcome, FailureOutcome::Dead { attempts: 10 });
        assert_eq!(state.status, Some(ProcessingStatus::Dead));
        assert_eq!(state.next_attempt_at, None);
        assert!(state.is_processed);
    }

    #[test]
    fn test_late_success_does_not_resurrect_dead() {
        let controller = RetryController::new(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });
        let mut state = ProcessingState::default();
        let now = Utc::now();

        assert_eq!(
            controller.on_failure(&mut state, now, "boom"),
            FailureOutcome::Dead { attempts: 1 }
        );
        assert_eq!(
            controller.on_success(&mut state, now),
            SuccessOutcome::AlreadyTerminal(ProcessingStatus::Dead)
        );
        assert_eq!(state.status, Some(ProcessingStatus::Dead));
        assert_eq!(state.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_clears_error() {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        let now = Utc::now();

        controller.on_failure(&mut state, now, "boom");
        assert_eq!(controller.on_success(&mut state, now), SuccessOutcome::Succeeded);
        assert_eq!(state.status, Some(ProcessingStatus::Succeeded));
        assert_eq!(state.last_error, None);
        assert_eq!(state.next_attempt_at, None);
        assert!(state.is_processed);
        assert_eq!(state.processed_at, Some(now));
    }

    #[test]
    fn test_drop_keeps_reason() {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        let now = Utc::now();

        controller.on_drop(&mut state, now, "posting gate: period closed");
        assert_eq!(state.status, Some(ProcessingStatus::Succeeded));
        assert!(state.is_processed);
        assert_eq!(state.last_error.as_deref(), Some("posting gate: period closed"));
    }

    #[test]
    fn test_exhausted_goes_dead() {
        let controller = RetryController::default();
        let mut state = ProcessingState {
            attempts: 3,
            ..ProcessingState::default()
        };
        let outcome = controller.on_exhausted(&mut state, Utc::now(), "retries exhausted");
        assert_eq!(outcome, FailureOutcome::Dead { attempts: 10 });
        assert_eq!(state.next_attempt_at, None);
    }
}
