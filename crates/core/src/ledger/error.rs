//! Ledger error types for validation and reversal.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::ledger::stock::StockKey;

/// Errors raised while building or correcting ledger rows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    // ========== Journal Validation ==========
    /// A journal needs at least a debit and a credit leg.
    #[error("Journal must have at least 2 lines")]
    InsufficientLines,

    #[error("Journal is not balanced. Debit: {debit}, Credit: {credit}")]
    UnbalancedJournal { debit: Decimal, credit: Decimal },

    #[error("Line amount cannot be negative")]
    NegativeAmount,

    /// A line must carry exactly one of debit or credit.
    #[error("Line {0} must specify either debit or credit, not both or neither")]
    InvalidLine(usize),

    // ========== Stock Validation ==========
    #[error("Stock movement {0} has zero quantity")]
    ZeroQuantity(usize),

    #[error("Stock movement {0} has a negative unit cost")]
    NegativeUnitCost(usize),

    /// Rebuild was given a row belonging to another key.
    #[error("Stock row does not belong to {0}")]
    KeyMismatch(StockKey),

    #[error("Arithmetic overflow while computing {0}")]
    Overflow(&'static str),
}

impl LedgerError {
    /// Returns the error code recorded on failed outbox records.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines => "INSUFFICIENT_LINES",
            Self::UnbalancedJournal { .. } => "UNBALANCED_JOURNAL",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::InvalidLine(_) => "INVALID_LINE",
            Self::ZeroQuantity(_) => "ZERO_QUANTITY",
            Self::NegativeUnitCost(_) => "NEGATIVE_UNIT_COST",
            Self::KeyMismatch(_) => "KEY_MISMATCH",
            Self::Overflow(_) => "OVERFLOW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InsufficientLines.error_code(), "INSUFFICIENT_LINES");
        assert_eq!(LedgerError::InvalidLine(0).error_code(), "INVALID_LINE");
        assert_eq!(LedgerError::ZeroQuantity(1).error_code(), "ZERO_QUANTITY");
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::UnbalancedJournal {
            debit: Decimal::new(10000, 2),
            credit: Decimal::new(5000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Journal is not balanced. Debit: 100.00, Credit: 50.00"
        );
    }
}
