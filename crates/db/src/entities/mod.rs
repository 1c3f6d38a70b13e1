//! `SeaORM` entity definitions.

pub mod prelude;

pub mod account_transactions;
pub mod accounting_periods;
pub mod businesses;
pub mod compensation_requests;
pub mod idempotency_keys;
pub mod journals;
pub mod outbox_records;
pub mod sea_orm_active_enums;
pub mod stock_histories;
pub mod stock_summaries;
pub mod tenant_leases;
