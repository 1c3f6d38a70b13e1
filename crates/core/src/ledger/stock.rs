//! Inventory valuation ledger rows.

use std::fmt;

use chrono::NaiveDate;
use ledgerline_shared::types::{StockHistoryId, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::ReferenceType;
use crate::ledger::error::LedgerError;

/// Product type used when a movement does not name one.
pub const DEFAULT_PRODUCT_TYPE: &str = "goods";

fn default_product_type() -> String {
    DEFAULT_PRODUCT_TYPE.to_string()
}

/// Identity of a running balance. An empty batch number means "no batch".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: TenantId,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub product_type: String,
    pub batch_number: String,
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tenant_id, self.warehouse_id, self.product_id, self.product_type
        )?;
        if !self.batch_number.is_empty() {
            write!(f, "#{}", self.batch_number)?;
        }
        Ok(())
    }
}

/// One requested movement, as carried in an event's `stock` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    #[serde(default = "default_product_type")]
    pub product_type: String,
    #[serde(default)]
    pub batch_number: String,
    /// Signed: positive receives stock, negative issues it.
    pub qty: Decimal,
    #[serde(default)]
    pub unit_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StockMovement {
    #[must_use]
    pub fn key(&self, tenant_id: TenantId) -> StockKey {
        StockKey {
            tenant_id,
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            product_type: self.product_type.clone(),
            batch_number: self.batch_number.clone(),
        }
    }

    /// Checks a batch of movements. `index` in errors is the position in the batch.
    pub fn validate_all(movements: &[Self]) -> Result<(), LedgerError> {
        for (index, movement) in movements.iter().enumerate() {
            if movement.qty.is_zero() {
                return Err(LedgerError::ZeroQuantity(index));
            }
            if movement.unit_cost.is_sign_negative() && !movement.unit_cost.is_zero() {
                return Err(LedgerError::NegativeUnitCost(index));
            }
        }
        Ok(())
    }

    /// Turns the movement into a row ready to insert.
    #[must_use]
    pub fn into_row(
        self,
        tenant_id: TenantId,
        reference_type: ReferenceType,
        reference_id: &str,
        transaction_date: NaiveDate,
    ) -> StockRow {
        StockRow {
            id: StockHistoryId::new(),
            key: self.key(tenant_id),
            qty: self.qty,
            unit_cost: self.unit_cost,
            reference_type,
            reference_id: reference_id.to_string(),
            transaction_date,
            description: self.description,
            is_reversal: false,
            reverses_id: None,
            reversed_by_id: None,
        }
    }
}

/// A stored stock-history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRow {
    pub id: StockHistoryId,
    pub key: StockKey,
    pub qty: Decimal,
    pub unit_cost: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub is_reversal: bool,
    pub reverses_id: Option<StockHistoryId>,
    pub reversed_by_id: Option<StockHistoryId>,
}

impl StockRow {
    /// Not reversed and not itself a reversal.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_reversal && self.reversed_by_id.is_none()
    }

    /// Signed value: `qty * unit_cost`.
    #[must_use]
    pub fn value(&self) -> Decimal {
        self.qty * self.unit_cost
    }
}

/// On-hand quantity: sum of `qty` over active rows.
#[must_use]
pub fn on_hand(rows: &[StockRow]) -> Decimal {
    rows.iter().filter(|r| r.is_active()).map(|r| r.qty).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn movement(qty: Decimal) -> StockMovement {
        StockMovement {
            warehouse_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_type: default_product_type(),
            batch_number: String::new(),
            qty,
            unit_cost: dec!(2.50),
            description: None,
        }
    }

    #[test]
    fn test_on_hand_ignores_reversed_and_reversal_rows() {
        let tenant = TenantId::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let base = movement(dec!(10));
        let received = base.clone().into_row(tenant, ReferenceType::PurchaseReceive, "1", date);
        let issued = StockMovement { qty: dec!(-3), ..base.clone() }
            .into_row(tenant, ReferenceType::SalesShipment, "2", date);
        let mut voided = StockMovement { qty: dec!(5), ..base }
            .into_row(tenant, ReferenceType::InventoryAdjustment, "3", date);
        let reversal = StockRow {
            id: StockHistoryId::new(),
            qty: dec!(-5),
            is_reversal: true,
            reverses_id: Some(voided.id),
            ..voided.clone()
        };
        voided.reversed_by_id = Some(reversal.id);

        assert_eq!(on_hand(&[received, issued, voided, reversal]), dec!(7));
    }

    #[test]
    fn test_validate_movements() {
        assert!(StockMovement::validate_all(&[movement(dec!(1))]).is_ok());
        assert_eq!(
            StockMovement::validate_all(&[movement(dec!(1)), movement(dec!(0))]),
            Err(LedgerError::ZeroQuantity(1))
        );
        let mut bad = movement(dec!(1));
        bad.unit_cost = dec!(-1);
        assert_eq!(
            StockMovement::validate_all(&[bad]),
            Err(LedgerError::NegativeUnitCost(0))
        );
    }

    #[test]
    fn test_movement_defaults() {
        let json = serde_json::json!({
            "warehouse_id": Uuid::new_v4(),
            "product_id": Uuid::new_v4(),
            "qty": "4"
        });
        let movement: StockMovement = serde_json::from_value(json).unwrap();
        assert_eq!(movement.product_type, DEFAULT_PRODUCT_TYPE);
        assert!(movement.batch_number.is_empty());
        assert_eq!(movement.unit_cost, Decimal::ZERO);
    }

    #[test]
    fn test_key_display_includes_batch() {
        let mut key = movement(dec!(1)).key(TenantId::new());
        assert!(!key.to_string().contains('#'));
        key.batch_number = "B1".to_string();
        assert!(key.to_string().ends_with("#B1"));
    }
}
