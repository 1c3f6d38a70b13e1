//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.
//! Operations that must join the posting transaction take a generic
//! `ConnectionTrait` instead of using the repository's own connection.

pub mod business;
pub mod compensation;
pub mod idempotency;
pub mod journal;
pub mod lease;
pub mod outbox;
pub mod period;
pub mod stock;

pub use business::{BusinessError, BusinessProfile, BusinessRepository};
pub use compensation::{CompensationRequestWriter, DeadLetter, DeadLetterCompensator};
pub use idempotency::IdempotencyRepository;
pub use journal::{JournalRepository, LedgerStoreError};
pub use lease::{LeaseToken, PgTenantLease, TenantLease};
pub use outbox::{ClaimedRecord, OutboxError, OutboxRepository};
pub use period::PeriodRepository;
pub use stock::StockRepository;
