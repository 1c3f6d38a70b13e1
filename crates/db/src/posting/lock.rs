//! Authoritative per-tenant lock: a transaction-scoped advisory lock.
//!
//! Taken as the first statement of the posting transaction and released by
//! Postgres at commit or rollback. The wait is bounded by `lock_timeout`, so a
//! stuck holder turns into a retryable error instead of a hung worker.

use std::time::Duration;

use ledgerline_shared::types::TenantId;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};

use super::error::PostingError;

/// Folds a tenant id into the 64-bit advisory lock key space.
#[must_use]
pub fn advisory_key(tenant_id: TenantId) -> i64 {
    let (hi, lo) = tenant_id.into_inner().as_u64_pair();
    i64::from_be_bytes((hi ^ lo).to_be_bytes())
}

/// Takes the tenant's advisory lock on `conn`, which must be a transaction.
///
/// # Errors
///
/// Returns `LockTimeout` if the lock is not granted within `timeout`, or a
/// database error.
pub async fn lock_tenant<C: ConnectionTrait>(
    conn: &C,
    tenant_id: TenantId,
    timeout: Duration,
) -> Result<(), PostingError> {
    let timeout_ms = timeout.as_millis().max(1);
    conn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
        .await?;

    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock($1)",
        [advisory_key(tenant_id).into()],
    ))
    .await
    .map_err(|err| {
        if is_lock_timeout(&err) {
            PostingError::LockTimeout(tenant_id)
        } else {
            PostingError::Database(err)
        }
    })?;
    Ok(())
}

fn is_lock_timeout(err: &DbErr) -> bool {
    // SQLSTATE 55P03: "canceling statement due to lock timeout"
    let message = err.to_string();
    message.contains("lock timeout") || message.contains("55P03")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_advisory_key_is_stable() {
        let tenant = TenantId::from_uuid(Uuid::parse_str("0192f3c0-7d1e-7a4b-9c2d-5e6f7a8b9c0d").unwrap());
        assert_eq!(advisory_key(tenant), advisory_key(tenant));
    }

    #[test]
    fn test_advisory_key_differs_between_tenants() {
        let a = TenantId::new();
        let b = TenantId::new();
        assert_ne!(advisory_key(a), advisory_key(b));
    }

    #[test]
    fn test_lock_timeout_detection() {
        let err = DbErr::Custom("canceling statement due to lock timeout".to_string());
        assert!(is_lock_timeout(&err));
        assert!(!is_lock_timeout(&DbErr::Custom("connection reset".to_string())));
    }
}
