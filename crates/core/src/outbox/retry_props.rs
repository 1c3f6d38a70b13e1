//! Property-based tests for `RetryController`.

use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;

use crate::outbox::retry::{FailureOutcome, ProcessingState, RetryController, RetryPolicy};
use crate::outbox::types::ProcessingStatus;

#[derive(Debug, Clone, Copy)]
enum Step {
    Exhausted,
    Success,
    Failure,
    Drop,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Exhausted),
        Just(Step::Success),
        Just(Step::Failure),
        Just(Step::Drop),
    ]
}

fn apply(controller: &RetryController, state: &mut ProcessingState, step: Step, offset: i64) {
    let now = Utc.timestamp_opt(1_790_000_000, 0).unwrap() + TimeDelta::seconds(offset);
    match step {
        Step::Exhausted => {
            controller.on_exhausted(state, now, "exhausted");
        }
        Step::Success => {
            controller.on_success(state, now);
        }
        Step::Failure => {
            controller.on_failure(state, now, "failure");
        }
        Step::Drop => {
            controller.on_drop(state, now, "dropped");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Once DEAD, no sequence of updates moves the record away from DEAD.
    #[test]
    fn prop_dead_is_terminal(
        max_attempts in 1_u32..12,
        steps in prop::collection::vec(arb_step(), 0..40),
    ) {
        let controller = RetryController::new(RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        });
        let mut state = ProcessingState::default();
        for _ in 0..max_attempts {
            controller.on_failure(&mut state, Utc::now(), "failure");
        }
        prop_assert_eq!(state.status, Some(ProcessingStatus::Dead));
        let frozen = state.clone();

        for (i, step) in steps.into_iter().enumerate() {
            apply(&controller, &mut state, step, i64::try_from(i).unwrap());
            prop_assert_eq!(&state, &frozen);
        }
    }

    /// SUCCEEDED is terminal in the same way.
    #[test]
    fn prop_succeeded_is_terminal(steps in prop::collection::vec(arb_step(), 0..40)) {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        controller.on_success(&mut state, Utc::now());
        let frozen = state.clone();

        for (i, step) in steps.into_iter().enumerate() {
            apply(&controller, &mut state, step, i64::try_from(i).unwrap());
            prop_assert_eq!(&state, &frozen);
        }
    }

    /// Consecutive failures reach DEAD exactly at `max_attempts`, with no
    /// next attempt scheduled.
    #[test]
    fn prop_dead_exactly_at_max(max_attempts in 1_u32..30) {
        let controller = RetryController::new(RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        });
        let mut state = ProcessingState::default();
        let now = Utc::now();

        for attempt in 1..=max_attempts {
            let outcome = controller.on_failure(&mut state, now, "failure");
            if attempt < max_attempts {
                prop_assert!(
                    matches!(outcome, FailureOutcome::Retry { .. }),
                    "attempt {} should retry",
                    attempt
                );
                prop_assert!(state.next_attempt_at.is_some());
            } else {
                prop_assert_eq!(outcome, FailureOutcome::Dead { attempts: max_attempts });
                prop_assert!(state.next_attempt_at.is_none());
                prop_assert!(state.is_processed);
            }
        }
    }

    /// Retry times never move backwards across consecutive failures.
    #[test]
    fn prop_retry_times_non_decreasing(failures in 1_u32..9) {
        let controller = RetryController::default();
        let mut state = ProcessingState::default();
        let now = Utc::now();
        let mut last = now;

        for _ in 0..failures {
            if let FailureOutcome::Retry { next_attempt_at, .. } =
                controller.on_failure(&mut state, now, "failure")
            {
                prop_assert!(next_attempt_at >= last);
                last = next_attempt_at;
            }
        }
    }
}
