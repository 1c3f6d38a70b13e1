//! Reversal engine: corrections by offsetting rows, never by edits.
//!
//! For each eligible original the engine produces an exact opposite row that
//! points back at it (`reverses_id`), and reports the link to flip on the
//! original (`reversed_by_id`). Rows already reversed, and reversal rows
//! themselves, are skipped, so applying a reversal twice is a no-op.

use ledgerline_shared::types::{AccountTransactionId, JournalId, StockHistoryId};
use rust_decimal::Decimal;

use crate::ledger::journal::{PostedJournal, PostedLine};
use crate::ledger::stock::StockRow;

/// Why an original was not reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyReversed,
    IsReversal,
}

/// Reversal rows plus the originals that were left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalPlan<T, Id> {
    pub reversals: Vec<T>,
    pub skipped: Vec<(Id, SkipReason)>,
}

impl<T, Id> ReversalPlan<T, Id> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reversals.is_empty()
    }
}

impl<T, Id> Default for ReversalPlan<T, Id> {
    fn default() -> Self {
        Self {
            reversals: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Journal-level plan. Each reversal journal's `reverses_journal_id` names the original.
pub type JournalReversalPlan = ReversalPlan<PostedJournal, JournalId>;

/// Stock-level plan. Each reversal row's `reverses_id` names the original.
pub type StockReversalPlan = ReversalPlan<StockRow, StockHistoryId>;

fn reversal_memo(original: Option<&str>) -> String {
    format!("Reversal: {}", original.unwrap_or_default())
}

fn skip_reason(is_reversal: bool, already_reversed: bool) -> Option<SkipReason> {
    if is_reversal {
        Some(SkipReason::IsReversal)
    } else if already_reversed {
        Some(SkipReason::AlreadyReversed)
    } else {
        None
    }
}

/// Stateless reversal planner.
pub struct ReversalEngine;

impl ReversalEngine {
    /// Plans reversal journals for `journals`.
    ///
    /// Debit and credit swap on every active leg. The reversal keeps the
    /// original transaction date so period totals net to zero.
    #[must_use]
    pub fn plan_journals(journals: &[PostedJournal]) -> JournalReversalPlan {
        let mut plan = JournalReversalPlan::default();
        for journal in journals {
            if let Some(reason) =
                skip_reason(journal.is_reversal, journal.reversed_by_journal_id.is_some())
            {
                plan.skipped.push((journal.id, reason));
                continue;
            }

            let reversal_id = JournalId::new();
            let lines: Vec<PostedLine> = journal
                .lines
                .iter()
                .filter(|line| line.is_active())
                .map(|line| PostedLine {
                    id: AccountTransactionId::new(),
                    journal_id: reversal_id,
                    account_id: line.account_id,
                    debit: line.credit,
                    credit: line.debit,
                    description: Some(reversal_memo(line.description.as_deref())),
                    is_reversal: true,
                    reverses_id: Some(line.id),
                    reversed_by_id: None,
                })
                .collect();

            if lines.is_empty() {
                plan.skipped.push((journal.id, SkipReason::AlreadyReversed));
                continue;
            }

            plan.reversals.push(PostedJournal {
                id: reversal_id,
                tenant_id: journal.tenant_id,
                branch_id: journal.branch_id,
                reference_type: journal.reference_type,
                reference_id: journal.reference_id.clone(),
                transaction_date: journal.transaction_date,
                currency: journal.currency.clone(),
                description: Some(reversal_memo(journal.description.as_deref())),
                is_reversal: true,
                reverses_journal_id: Some(journal.id),
                reversed_by_journal_id: None,
                lines,
            });
        }
        plan
    }

    /// Plans reversal rows for stock history.
    ///
    /// Quantity is negated and unit cost kept, so `qty * unit_cost` nets to zero.
    #[must_use]
    pub fn plan_stock(rows: &[StockRow]) -> StockReversalPlan {
        let mut plan = StockReversalPlan::default();
        for row in rows {
            if let Some(reason) = skip_reason(row.is_reversal, row.reversed_by_id.is_some()) {
                plan.skipped.push((row.id, reason));
                continue;
            }
            plan.reversals.push(StockRow {
                id: StockHistoryId::new(),
                key: row.key.clone(),
                qty: -row.qty,
                unit_cost: row.unit_cost,
                reference_type: row.reference_type,
                reference_id: row.reference_id.clone(),
                transaction_date: row.transaction_date,
                description: Some(reversal_memo(row.description.as_deref())),
                is_reversal: true,
                reverses_id: Some(row.id),
                reversed_by_id: None,
            });
        }
        plan
    }

    /// Applies a journal plan's links to the originals in memory.
    pub fn link_journals(originals: &mut [PostedJournal], plan: &JournalReversalPlan) {
        for reversal in &plan.reversals {
            let Some(original) = originals
                .iter_mut()
                .find(|j| Some(j.id) == reversal.reverses_journal_id)
            else {
                continue;
            };
            original.reversed_by_journal_id = Some(reversal.id);
            for line in &reversal.lines {
                if let Some(target) = original
                    .lines
                    .iter_mut()
                    .find(|l| Some(l.id) == line.reverses_id)
                {
                    target.reversed_by_id = Some(line.id);
                }
            }
        }
    }

    /// Applies a stock plan's links to the originals in memory.
    pub fn link_stock(originals: &mut [StockRow], plan: &StockReversalPlan) {
        for reversal in &plan.reversals {
            if let Some(original) = originals.iter_mut().find(|r| Some(r.id) == reversal.reverses_id) {
                original.reversed_by_id = Some(reversal.id);
            }
        }
    }

    /// Returns true if debits equal credits over the legs.
    #[must_use]
    pub fn is_balanced(lines: &[PostedLine]) -> bool {
        let debit: Decimal = lines.iter().map(|l| l.debit).sum();
        let credit: Decimal = lines.iter().map(|l| l.credit).sum();
        debit == credit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerline_shared::types::TenantId;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::event::ReferenceType;
    use crate::ledger::journal::{JournalDraft, JournalLine};
    use crate::ledger::stock::StockMovement;

    fn journal() -> PostedJournal {
        JournalDraft {
            tenant_id: TenantId::new(),
            branch_id: None,
            reference_type: ReferenceType::Invoice,
            reference_id: "100".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            currency: "USD".to_string(),
            description: Some("INV-100".to_string()),
            lines: vec![
                JournalLine::debit(Uuid::new_v4(), dec!(100.00)),
                JournalLine::credit(Uuid::new_v4(), dec!(100.00)),
            ],
        }
        .into_posted()
        .unwrap()
    }

    #[test]
    fn test_journal_reversal_swaps_sides() {
        let original = journal();
        let plan = ReversalEngine::plan_journals(std::slice::from_ref(&original));
        assert_eq!(plan.reversals.len(), 1);

        let reversal = &plan.reversals[0];
        assert!(reversal.is_reversal);
        assert_eq!(reversal.reverses_journal_id, Some(original.id));
        assert_eq!(reversal.transaction_date, original.transaction_date);
        assert_eq!(reversal.description.as_deref(), Some("Reversal: INV-100"));
        assert_eq!(reversal.lines[0].credit, original.lines[0].debit);
        assert_eq!(reversal.lines[1].debit, original.lines[1].credit);
        assert_eq!(original.net() + reversal.net(), Decimal::ZERO);
        assert!(ReversalEngine::is_balanced(&reversal.lines));
    }

    #[test]
    fn test_journal_reversal_is_idempotent_after_linking() {
        let mut originals = vec![journal()];
        let plan = ReversalEngine::plan_journals(&originals);
        ReversalEngine::link_journals(&mut originals, &plan);

        assert!(originals[0].lines.iter().all(|l| l.reversed_by_id.is_some()));
        let again = ReversalEngine::plan_journals(&originals);
        assert!(again.is_empty());
        assert_eq!(again.skipped, vec![(originals[0].id, SkipReason::AlreadyReversed)]);
    }

    #[test]
    fn test_reversal_journal_is_not_reversed() {
        let plan = ReversalEngine::plan_journals(&[journal()]);
        let again = ReversalEngine::plan_journals(&plan.reversals);
        assert!(again.is_empty());
        assert_eq!(again.skipped[0].1, SkipReason::IsReversal);
    }

    #[test]
    fn test_stock_reversal_negates_quantity() {
        let row = StockMovement {
            warehouse_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_type: "goods".to_string(),
            batch_number: String::new(),
            qty: dec!(12),
            unit_cost: dec!(3.25),
            description: None,
        }
        .into_row(
            TenantId::new(),
            ReferenceType::InventoryAdjustment,
            "adj-1",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        );
        let mut originals = vec![row];
        let plan = ReversalEngine::plan_stock(&originals);
        let reversal = &plan.reversals[0];
        assert_eq!(reversal.qty, dec!(-12));
        assert_eq!(reversal.unit_cost, dec!(3.25));
        assert_eq!(reversal.key, originals[0].key);
        assert_eq!(originals[0].value() + reversal.value(), Decimal::ZERO);

        ReversalEngine::link_stock(&mut originals, &plan);
        assert_eq!(originals[0].reversed_by_id, Some(reversal.id));
        assert!(ReversalEngine::plan_stock(&originals).is_empty());
    }
}
