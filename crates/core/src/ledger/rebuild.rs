//! Running-balance rebuild for a stock key.
//!
//! Rebuild is a pure function of the rows in scope: reversed rows and
//! reversal rows are dropped, the rest are ordered by
//! (transaction date, non-negative quantities first, id) and folded into a
//! running quantity and value. Same-day receipts therefore land before
//! same-day issues, which keeps legitimate data from dipping below zero.

use std::cmp::Ordering;

use chrono::NaiveDate;
use ledgerline_shared::types::StockHistoryId;
use rust_decimal::Decimal;

use crate::ledger::error::LedgerError;
use crate::ledger::stock::{StockKey, StockRow};

/// Total order used for running balances.
#[must_use]
pub fn running_balance_order(a: &StockRow, b: &StockRow) -> Ordering {
    a.transaction_date
        .cmp(&b.transaction_date)
        .then_with(|| a.qty.is_sign_negative().cmp(&b.qty.is_sign_negative()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Balance after applying one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildEntry {
    pub row_id: StockHistoryId,
    pub transaction_date: NaiveDate,
    pub qty: Decimal,
    pub running_qty: Decimal,
    pub running_value: Decimal,
}

/// A point where the running quantity went below zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeDip {
    pub row_id: StockHistoryId,
    pub transaction_date: NaiveDate,
    pub running_qty: Decimal,
}

/// Result of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRebuild {
    pub key: StockKey,
    /// First date replayed; earlier rows only feed the opening balance.
    pub from: Option<NaiveDate>,
    pub opening_qty: Decimal,
    pub opening_value: Decimal,
    pub entries: Vec<RebuildEntry>,
    pub on_hand: Decimal,
    pub stock_value: Decimal,
    /// `stock_value / on_hand`, zero when nothing is on hand.
    pub average_cost: Decimal,
    pub last_transaction_date: Option<NaiveDate>,
    pub negative_dips: Vec<NegativeDip>,
}

impl StockRebuild {
    /// Returns true if the running balance ever went negative.
    #[must_use]
    pub fn has_negative_dip(&self) -> bool {
        !self.negative_dips.is_empty()
    }
}

/// Stateless rebuild engine.
pub struct RebuildEngine;

impl RebuildEngine {
    /// Rebuilds `key` from `rows`, replaying entries on or after `from`.
    ///
    /// Every row must belong to `key`.
    pub fn rebuild(
        key: &StockKey,
        rows: &[StockRow],
        from: Option<NaiveDate>,
    ) -> Result<StockRebuild, LedgerError> {
        if rows.iter().any(|r| &r.key != key) {
            return Err(LedgerError::KeyMismatch(key.clone()));
        }

        let mut active: Vec<&StockRow> = rows.iter().filter(|r| r.is_active()).collect();
        active.sort_by(|a, b| running_balance_order(a, b));

        let mut running_qty = Decimal::ZERO;
        let mut running_value = Decimal::ZERO;
        let mut opening_qty = Decimal::ZERO;
        let mut opening_value = Decimal::ZERO;
        let mut entries = Vec::new();
        let mut negative_dips = Vec::new();

        for row in active {
            running_qty = running_qty
                .checked_add(row.qty)
                .ok_or(LedgerError::Overflow("running quantity"))?;
            let value = row
                .qty
                .checked_mul(row.unit_cost)
                .ok_or(LedgerError::Overflow("row value"))?;
            running_value = running_value
                .checked_add(value)
                .ok_or(LedgerError::Overflow("running value"))?;

            if running_qty.is_sign_negative() && !running_qty.is_zero() {
                negative_dips.push(NegativeDip {
                    row_id: row.id,
                    transaction_date: row.transaction_date,
                    running_qty,
                });
            }

            if from.is_some_and(|start| row.transaction_date < start) {
                opening_qty = running_qty;
                opening_value = running_value;
                continue;
            }
            entries.push(RebuildEntry {
                row_id: row.id,
                transaction_date: row.transaction_date,
                qty: row.qty,
                running_qty,
                running_value,
            });
        }

        let last_transaction_date = rows
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.transaction_date)
            .max();

        let average_cost = if running_qty > Decimal::ZERO {
            running_value
                .checked_div(running_qty)
                .ok_or(LedgerError::Overflow("average cost"))?
                .round_dp(6)
        } else {
            Decimal::ZERO
        };

        Ok(StockRebuild {
            key: key.clone(),
            from,
            opening_qty,
            opening_value,
            entries,
            on_hand: running_qty,
            stock_value: running_value,
            average_cost,
            last_transaction_date,
            negative_dips,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_shared::types::TenantId;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::event::ReferenceType;

    fn key() -> StockKey {
        StockKey {
            tenant_id: TenantId::new(),
            warehouse_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_type: "goods".to_string(),
            batch_number: String::new(),
        }
    }

    fn row(key: &StockKey, day: u32, qty: Decimal, cost: Decimal) -> StockRow {
        StockRow {
            id: StockHistoryId::new(),
            key: key.clone(),
            qty,
            unit_cost: cost,
            reference_type: ReferenceType::InventoryAdjustment,
            reference_id: format!("r{day}"),
            transaction_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            description: None,
            is_reversal: false,
            reverses_id: None,
            reversed_by_id: None,
        }
    }

    #[test]
    fn test_same_day_issue_sorts_after_receipt() {
        let key = key();
        // Issue written first (smaller v7 id) on the same day as the receipt.
        let issue = row(&key, 5, dec!(-4), dec!(2));
        let receipt = row(&key, 5, dec!(10), dec!(2));
        let rebuild = RebuildEngine::rebuild(&key, &[issue.clone(), receipt.clone()], None).unwrap();

        assert_eq!(rebuild.entries[0].row_id, receipt.id);
        assert_eq!(rebuild.entries[1].row_id, issue.id);
        assert!(!rebuild.has_negative_dip());
        assert_eq!(rebuild.on_hand, dec!(6));
        assert_eq!(rebuild.stock_value, dec!(12));
        assert_eq!(rebuild.average_cost, dec!(2));
    }

    #[test]
    fn test_negative_dip_is_flagged() {
        let key = key();
        let rows = [row(&key, 1, dec!(-3), dec!(1)), row(&key, 2, dec!(5), dec!(1))];
        let rebuild = RebuildEngine::rebuild(&key, &rows, None).unwrap();
        assert_eq!(rebuild.negative_dips.len(), 1);
        assert_eq!(rebuild.negative_dips[0].running_qty, dec!(-3));
        assert_eq!(rebuild.on_hand, dec!(2));
    }

    #[test]
    fn test_from_date_feeds_opening_balance() {
        let key = key();
        let rows = [
            row(&key, 1, dec!(10), dec!(1)),
            row(&key, 2, dec!(-2), dec!(1)),
            row(&key, 10, dec!(5), dec!(1)),
        ];
        let from = NaiveDate::from_ymd_opt(2026, 3, 2);
        let rebuild = RebuildEngine::rebuild(&key, &rows, from).unwrap();
        assert_eq!(rebuild.opening_qty, dec!(10));
        assert_eq!(rebuild.entries.len(), 2);
        assert_eq!(rebuild.entries[0].running_qty, dec!(8));
        assert_eq!(rebuild.on_hand, dec!(13));
        assert_eq!(rebuild.last_transaction_date, NaiveDate::from_ymd_opt(2026, 3, 10));
    }

    #[test]
    fn test_reversed_rows_are_excluded() {
        let key = key();
        let mut original = row(&key, 1, dec!(10), dec!(1));
        let mut reversal = row(&key, 1, dec!(-10), dec!(1));
        reversal.is_reversal = true;
        reversal.reverses_id = Some(original.id);
        original.reversed_by_id = Some(reversal.id);

        let rebuild = RebuildEngine::rebuild(&key, &[original, reversal], None).unwrap();
        assert!(rebuild.entries.is_empty());
        assert_eq!(rebuild.on_hand, Decimal::ZERO);
        assert_eq!(rebuild.average_cost, Decimal::ZERO);
        assert_eq!(rebuild.last_transaction_date, None);
    }

    #[test]
    fn test_foreign_row_is_rejected() {
        let key = key();
        let other = self::key();
        let result = RebuildEngine::rebuild(&key, &[row(&other, 1, dec!(1), dec!(1))], None);
        assert!(matches!(result, Err(LedgerError::KeyMismatch(_))));
    }
}
