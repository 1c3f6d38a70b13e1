//! The closed set of document kinds that produce ledger events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::event::error::EventError;

/// Reference type of a ledger event: which kind of document changed.
///
/// The set is closed. Every variant must have a posting routine registered
/// before workers start (see `HandlerRegistry::validate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceType {
    /// Sales invoice.
    Invoice,
    /// Customer credit note.
    CreditNote,
    /// Payment received from a customer.
    CustomerPayment,
    /// Advance received from a customer.
    CustomerAdvance,
    /// Refund paid to a customer.
    CustomerRefund,
    /// Customer credit applied to an invoice.
    CustomerApplyCredit,
    /// Vendor bill.
    Bill,
    /// Supplier credit.
    SupplierCredit,
    /// Payment made to a supplier.
    SupplierPayment,
    /// Advance paid to a supplier.
    SupplierAdvance,
    /// Refund received from a supplier.
    SupplierRefund,
    /// Supplier credit applied to a bill.
    SupplierApplyCredit,
    /// Expense.
    Expense,
    /// Manual journal.
    Journal,
    /// Opening balance of an account.
    AccountOpeningBalance,
    /// Transfer between bank accounts.
    BankTransfer,
    /// Transfer between ledger accounts.
    AccountTransfer,
    /// Owner contribution.
    OwnerContribution,
    /// Owner drawing.
    OwnerDrawing,
    /// Opening stock of a product.
    ProductOpeningStock,
    /// Inventory adjustment.
    InventoryAdjustment,
    /// Stock transfer between warehouses.
    TransferOrder,
    /// Goods received against a purchase order.
    PurchaseReceive,
    /// Goods shipped against a sales order.
    SalesShipment,
    /// Assembly of a composite product.
    ProductCompositeBuild,
    /// Ledger drift correction. Bypasses the posting gate.
    Reconcile,
}

impl ReferenceType {
    /// Every reference type, in declaration order.
    pub const ALL: [Self; 26] = [
        Self::Invoice,
        Self::CreditNote,
        Self::CustomerPayment,
        Self::CustomerAdvance,
        Self::CustomerRefund,
        Self::CustomerApplyCredit,
        Self::Bill,
        Self::SupplierCredit,
        Self::SupplierPayment,
        Self::SupplierAdvance,
        Self::SupplierRefund,
        Self::SupplierApplyCredit,
        Self::Expense,
        Self::Journal,
        Self::AccountOpeningBalance,
        Self::BankTransfer,
        Self::AccountTransfer,
        Self::OwnerContribution,
        Self::OwnerDrawing,
        Self::ProductOpeningStock,
        Self::InventoryAdjustment,
        Self::TransferOrder,
        Self::PurchaseReceive,
        Self::SalesShipment,
        Self::ProductCompositeBuild,
        Self::Reconcile,
    ];

    /// Wire name, identical to the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::CreditNote => "CreditNote",
            Self::CustomerPayment => "CustomerPayment",
            Self::CustomerAdvance => "CustomerAdvance",
            Self::CustomerRefund => "CustomerRefund",
            Self::CustomerApplyCredit => "CustomerApplyCredit",
            Self::Bill => "Bill",
            Self::SupplierCredit => "SupplierCredit",
            Self::SupplierPayment => "SupplierPayment",
            Self::SupplierAdvance => "SupplierAdvance",
            Self::SupplierRefund => "SupplierRefund",
            Self::SupplierApplyCredit => "SupplierApplyCredit",
            Self::Expense => "Expense",
            Self::Journal => "Journal",
            Self::AccountOpeningBalance => "AccountOpeningBalance",
            Self::BankTransfer => "BankTransfer",
            Self::AccountTransfer => "AccountTransfer",
            Self::OwnerContribution => "OwnerContribution",
            Self::OwnerDrawing => "OwnerDrawing",
            Self::ProductOpeningStock => "ProductOpeningStock",
            Self::InventoryAdjustment => "InventoryAdjustment",
            Self::TransferOrder => "TransferOrder",
            Self::PurchaseReceive => "PurchaseReceive",
            Self::SalesShipment => "SalesShipment",
            Self::ProductCompositeBuild => "ProductCompositeBuild",
            Self::Reconcile => "Reconcile",
        }
    }

    /// Returns true if events of this type skip the period-lock check.
    #[must_use]
    pub const fn bypasses_posting_gate(self) -> bool {
        matches!(self, Self::Reconcile)
    }

    /// Returns true if a DEAD record of this type must revert its document.
    ///
    /// These documents sit in a "Confirmed" state until their ledger effect
    /// lands; if posting permanently fails they go back to draft.
    #[must_use]
    pub const fn requires_compensation(self) -> bool {
        matches!(
            self,
            Self::Invoice
                | Self::CreditNote
                | Self::Bill
                | Self::SupplierCredit
                | Self::CustomerPayment
                | Self::SupplierPayment
                | Self::InventoryAdjustment
                | Self::TransferOrder
                | Self::PurchaseReceive
                | Self::SalesShipment
                | Self::ProductCompositeBuild
        )
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| EventError::UnknownReferenceType(s.to_string()))
    }
}
