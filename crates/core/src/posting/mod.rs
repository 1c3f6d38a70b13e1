//! Pre-posting checks and coordination.
//!
//! - `gate` - period-lock rules deciding whether an event may post at all
//! - `idempotency` - whether a (tenant, handler, message) was already applied
//! - `router` - reference type to posting routine registry
//! - `lock` - in-process per-tenant lock registry

pub mod gate;
pub mod idempotency;
pub mod lock;
pub mod router;

#[cfg(test)]
mod gate_props;

pub use gate::{AccountingPeriod, GateDecision, GateRejection, PeriodLockConfig, PeriodStatus, PostingGate};
pub use idempotency::{IdempotencyDecision, IdempotencyKey, IdempotencyRecord, IdempotencyStatus};
pub use lock::{TenantLockGuard, TenantLockRegistry};
pub use router::{HandlerRegistry, RouterError};
