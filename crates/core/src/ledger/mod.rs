//! Journal and inventory ledgers.
//!
//! Rows are append-only. Corrections go through `ReversalEngine`, and derived
//! stock summaries are recomputed by `RebuildEngine`.

pub mod error;
pub mod journal;
pub mod rebuild;
pub mod reversal;
pub mod stock;

#[cfg(test)]
mod rebuild_props;
#[cfg(test)]
mod reversal_props;

pub use error::LedgerError;
pub use journal::{EntryType, JournalDraft, JournalLine, JournalTotals, PostedJournal, PostedLine};
pub use rebuild::{running_balance_order, NegativeDip, RebuildEngine, RebuildEntry, StockRebuild};
pub use reversal::{
    JournalReversalPlan, ReversalEngine, ReversalPlan, SkipReason, StockReversalPlan,
};
pub use stock::{on_hand, StockKey, StockMovement, StockRow, DEFAULT_PRODUCT_TYPE};
