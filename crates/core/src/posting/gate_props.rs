//! Property-based tests for `PostingGate`.

use chrono::{Days, NaiveDate};
use ledgerline_shared::types::TenantId;
use proptest::prelude::*;

use crate::event::{ProcessingContext, ReferenceType};
use crate::posting::gate::{
    AccountingPeriod, GateDecision, GateRejection, PeriodLockConfig, PeriodStatus, PostingGate,
};

fn arb_reference_type() -> impl Strategy<Value = ReferenceType> {
    prop::sample::select(ReferenceType::ALL.to_vec())
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0_u64..3_650).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Days::new(offset)
    })
}

fn arb_status() -> impl Strategy<Value = PeriodStatus> {
    prop_oneof![
        Just(PeriodStatus::Open),
        Just(PeriodStatus::SoftClose),
        Just(PeriodStatus::Closed),
    ]
}

fn arb_period() -> impl Strategy<Value = AccountingPeriod> {
    (arb_date(), 0_u64..90, arb_status()).prop_map(|(start, len, status)| AccountingPeriod {
        start_date: start,
        end_date: start + Days::new(len),
        status,
    })
}

fn arb_config() -> impl Strategy<Value = PeriodLockConfig> {
    (
        prop::option::of(arb_date()),
        prop::collection::vec(arb_period(), 0..6),
    )
        .prop_map(|(lock_date, periods)| PeriodLockConfig { lock_date, periods })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Reconcile events bypass every configuration.
    #[test]
    fn prop_reconcile_always_bypasses(date in arb_date(), config in arb_config()) {
        let ctx = ProcessingContext::system(TenantId::new(), "c");
        prop_assert_eq!(
            PostingGate::evaluate(ReferenceType::Reconcile, date, &ctx, &config),
            GateDecision::Bypass
        );
    }

    /// Any date inside a CLOSED period is rejected for every other type.
    #[test]
    fn prop_closed_period_always_rejects(
        reference_type in arb_reference_type(),
        period in arb_period(),
        offset in 0_u64..90,
        config in arb_config(),
    ) {
        prop_assume!(reference_type != ReferenceType::Reconcile);
        let period = AccountingPeriod { status: PeriodStatus::Closed, ..period };
        let date = period.start_date + Days::new(offset.min(
            u64::try_from((period.end_date - period.start_date).num_days()).unwrap(),
        ));
        let mut config = config;
        config.periods.push(period);

        let ctx = ProcessingContext::system(TenantId::new(), "c");
        let decision = PostingGate::evaluate(reference_type, date, &ctx, &config);
        prop_assert!(matches!(
            decision,
            GateDecision::Reject(GateRejection::PeriodClosed { .. } | GateRejection::LockDate { .. })
        ), "expected PeriodClosed or LockDate rejection, got {:?}", decision);
    }

    /// Without a lock date or closed periods, the system actor always posts.
    #[test]
    fn prop_system_actor_posts_without_closed_periods(
        reference_type in arb_reference_type(),
        date in arb_date(),
        periods in prop::collection::vec(arb_period(), 0..6),
    ) {
        let periods = periods
            .into_iter()
            .filter(|p| p.status != PeriodStatus::Closed)
            .collect();
        let config = PeriodLockConfig { lock_date: None, periods };
        let ctx = ProcessingContext::system(TenantId::new(), "c");
        let decision = PostingGate::evaluate(reference_type, date, &ctx, &config);
        prop_assert!(!matches!(decision, GateDecision::Reject(_)), "rejected: {:?}", decision);
    }

    /// Every rejection message carries the gate prefix.
    #[test]
    fn prop_rejections_are_prefixed(
        reference_type in arb_reference_type(),
        date in arb_date(),
        config in arb_config(),
    ) {
        let ctx = ProcessingContext::system(TenantId::new(), "c");
        if let GateDecision::Reject(rejection) =
            PostingGate::evaluate(reference_type, date, &ctx, &config)
        {
            prop_assert!(rejection.to_string().starts_with("posting gate: "));
        }
    }
}
