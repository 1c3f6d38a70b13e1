//! Entity re-exports.

pub use super::account_transactions::Entity as AccountTransactions;
pub use super::accounting_periods::Entity as AccountingPeriods;
pub use super::businesses::Entity as Businesses;
pub use super::compensation_requests::Entity as CompensationRequests;
pub use super::idempotency_keys::Entity as IdempotencyKeys;
pub use super::journals::Entity as Journals;
pub use super::outbox_records::Entity as OutboxRecords;
pub use super::stock_histories::Entity as StockHistories;
pub use super::stock_summaries::Entity as StockSummaries;
pub use super::tenant_leases::Entity as TenantLeases;
