//! Property-based tests for `ReversalEngine`.

use chrono::NaiveDate;
use ledgerline_shared::types::TenantId;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::event::ReferenceType;
use crate::ledger::journal::{JournalDraft, JournalLine, PostedJournal};
use crate::ledger::reversal::ReversalEngine;
use crate::ledger::stock::{StockMovement, StockRow};

fn arb_uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1_i64..1_000_000_i64).prop_map(|n| Decimal::new(n, 2))
}

/// A balanced journal: each debit leg is matched by a credit leg of the same amount.
fn arb_journal() -> impl Strategy<Value = PostedJournal> {
    prop::collection::vec((arb_uuid(), arb_uuid(), arb_amount()), 1..4).prop_map(|pairs| {
        let lines = pairs
            .into_iter()
            .flat_map(|(dr, cr, amount)| {
                [JournalLine::debit(dr, amount), JournalLine::credit(cr, amount)]
            })
            .collect();
        JournalDraft {
            tenant_id: TenantId::new(),
            branch_id: None,
            reference_type: ReferenceType::Journal,
            reference_id: "j".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            currency: "USD".to_string(),
            description: None,
            lines,
        }
        .into_posted()
        .unwrap()
    })
}

fn arb_stock_rows() -> impl Strategy<Value = Vec<StockRow>> {
    let tenant = TenantId::from_uuid(Uuid::from_u128(7));
    prop::collection::vec(
        (
            (-1_000_i64..1_000).prop_filter("non-zero", |q| *q != 0),
            0_i64..100_000,
        ),
        1..10,
    )
    .prop_map(move |specs| {
        specs
            .into_iter()
            .map(|(qty, cost)| {
                StockMovement {
                    warehouse_id: Uuid::from_u128(1),
                    product_id: Uuid::from_u128(2),
                    product_type: "goods".to_string(),
                    batch_number: String::new(),
                    qty: Decimal::new(qty, 0),
                    unit_cost: Decimal::new(cost, 2),
                    description: None,
                }
                .into_row(
                    tenant,
                    ReferenceType::InventoryAdjustment,
                    "adj",
                    NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                )
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Original plus reversal nets to zero (debit - credit).
    #[test]
    fn prop_journal_reversal_nets_to_zero(journal in arb_journal()) {
        let plan = ReversalEngine::plan_journals(std::slice::from_ref(&journal));
        prop_assert_eq!(plan.reversals.len(), 1);
        let reversal = &plan.reversals[0];
        prop_assert_eq!(journal.net() + reversal.net(), Decimal::ZERO);
        prop_assert_eq!(reversal.lines.len(), journal.lines.len());
        for (original, reversed) in journal.lines.iter().zip(&reversal.lines) {
            prop_assert_eq!(original.account_id, reversed.account_id);
            prop_assert_eq!(original.debit, reversed.credit);
            prop_assert_eq!(original.credit, reversed.debit);
            prop_assert_eq!(reversed.reverses_id, Some(original.id));
        }
    }

    /// Per account, original plus reversal nets to zero.
    #[test]
    fn prop_journal_reversal_nets_per_account(journal in arb_journal()) {
        let plan = ReversalEngine::plan_journals(std::slice::from_ref(&journal));
        for line in &journal.lines {
            let account_net: Decimal = journal
                .lines
                .iter()
                .chain(plan.reversals[0].lines.iter())
                .filter(|l| l.account_id == line.account_id)
                .map(|l| l.net())
                .sum();
            prop_assert_eq!(account_net, Decimal::ZERO);
        }
    }

    /// Inventory: original plus reversal nets to zero in quantity and value.
    #[test]
    fn prop_stock_reversal_nets_to_zero(rows in arb_stock_rows()) {
        let plan = ReversalEngine::plan_stock(&rows);
        let qty: Decimal = rows.iter().chain(&plan.reversals).map(|r| r.qty).sum();
        let value: Decimal = rows.iter().chain(&plan.reversals).map(StockRow::value).sum();
        prop_assert_eq!(qty, Decimal::ZERO);
        prop_assert_eq!(value, Decimal::ZERO);
    }

    /// Reversing twice produces nothing the second time.
    #[test]
    fn prop_reversal_is_idempotent(mut rows in arb_stock_rows(), mut journals in prop::collection::vec(arb_journal(), 1..4)) {
        let stock_plan = ReversalEngine::plan_stock(&rows);
        ReversalEngine::link_stock(&mut rows, &stock_plan);
        let again = ReversalEngine::plan_stock(&rows);
        prop_assert!(again.is_empty());
        prop_assert_eq!(again.skipped.len(), rows.len());

        let journal_plan = ReversalEngine::plan_journals(&journals);
        ReversalEngine::link_journals(&mut journals, &journal_plan);
        prop_assert!(ReversalEngine::plan_journals(&journals).is_empty());

        // Reversal rows are never reversed either.
        prop_assert!(ReversalEngine::plan_stock(&stock_plan.reversals).is_empty());
        prop_assert!(ReversalEngine::plan_journals(&journal_plan.reversals).is_empty());
    }
}
