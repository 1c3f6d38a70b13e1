//! Database layer with `SeaORM` entities, repositories, and the posting pipeline.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repository abstractions for data access
//! - The posting pipeline that applies ledger events exactly once
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod posting;
pub mod repositories;

pub use posting::{
    default_routines, LedgerRepair, PostingError, PostingOutcome, PostingService, PostingSettings,
    Settlement,
};
pub use repositories::{
    BusinessRepository, CompensationRequestWriter, IdempotencyRepository, OutboxError,
    OutboxRepository, PgTenantLease,
};

use std::time::Duration;

use ledgerline_core::outbox::{BackoffPolicy, PublishPolicy, RetryPolicy};
use ledgerline_shared::config::{AppConfig, DatabaseConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a pooled connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Publish policy from the dispatcher settings.
#[must_use]
pub fn publish_policy(config: &AppConfig) -> PublishPolicy {
    PublishPolicy {
        max_attempts: config.outbox.max_publish_attempts,
        backoff: BackoffPolicy::from_secs(
            config.outbox.base_backoff_secs,
            config.outbox.max_backoff_secs,
        ),
        lock_ttl: Duration::from_secs(config.outbox.lock_ttl_secs),
    }
}

/// Retry policy from the processor settings.
#[must_use]
pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.processor.max_attempts,
        backoff: BackoffPolicy::from_secs(
            config.processor.base_backoff_secs,
            config.processor.max_backoff_secs,
        ),
    }
}

/// Lock timings from the lock settings.
#[must_use]
pub const fn posting_settings(config: &AppConfig) -> PostingSettings {
    PostingSettings {
        local_lock_wait: Duration::from_millis(config.lock.local_lock_wait_ms),
        db_lock_timeout: Duration::from_millis(config.lock.db_lock_timeout_ms),
    }
}
