//! Property-based tests for `BackoffPolicy`.

use std::time::Duration;

use proptest::prelude::*;

use crate::outbox::backoff::BackoffPolicy;

fn arb_policy() -> impl Strategy<Value = BackoffPolicy> {
    (1_u64..120, 1_u64..7_200).prop_map(|(base, cap)| BackoffPolicy::from_secs(base, cap))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The first retry waits exactly the base delay.
    #[test]
    fn prop_first_delay_is_base(policy in arb_policy()) {
        prop_assert_eq!(policy.delay(1), policy.base());
    }

    /// Delays never shrink as attempts grow.
    #[test]
    fn prop_delay_is_monotonic(policy in arb_policy(), attempt in 1_u32..10_000) {
        prop_assert!(policy.delay(attempt + 1) >= policy.delay(attempt));
    }

    /// Delays never exceed the cap.
    #[test]
    fn prop_delay_is_capped(policy in arb_policy(), attempt in 1_u32..=u32::MAX) {
        prop_assert!(policy.delay(attempt) <= policy.cap());
    }

    /// Below the cap the delay doubles each attempt.
    #[test]
    fn prop_delay_doubles_below_cap(base in 1_u64..10, attempt in 1_u32..8) {
        let policy = BackoffPolicy::from_secs(base, 1_000_000);
        prop_assert_eq!(
            policy.delay(attempt + 1),
            policy.delay(attempt) * 2
        );
        prop_assert!(policy.delay(attempt) >= Duration::from_secs(base));
    }
}
