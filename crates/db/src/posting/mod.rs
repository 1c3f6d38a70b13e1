//! The posting pipeline: applies ledger events exactly once.
//!
//! - `service` - the pipeline entry point and outbox settlement
//! - `routine` - per-reference-type posting routines
//! - `lock` - transaction-scoped tenant advisory lock
//! - `repair` - operator reversals, rebuilds, and DEAD replays
//! - `error` - posting errors and their retry classification

pub mod error;
pub mod lock;
pub mod repair;
pub mod routine;
pub mod service;

pub use error::{ErrorClass, PostingError};
pub use lock::{advisory_key, lock_tenant};
pub use repair::{LedgerRepair, RepairError};
pub use routine::{
    default_routines, DocumentPostingRoutine, PostingRoutine, PostingSummary, ReconcileRoutine,
    RoutineRegistry,
};
pub use service::{PostingOutcome, PostingService, PostingSettings, Settlement};
