//! Best-effort distributed tenant lease.
//!
//! A lease keeps two instances from working the same tenant at the same time
//! in the common case. It is advisory only: the transactional advisory lock
//! taken by the posting pipeline is what guarantees serialization.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ledgerline_shared::types::TenantId;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    Statement,
};
use uuid::Uuid;

use crate::entities::tenant_leases;

const ACQUIRE_SQL: &str = r"
INSERT INTO tenant_leases (business_id, holder, token, expires_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (business_id) DO UPDATE
SET holder = EXCLUDED.holder,
    token = EXCLUDED.token,
    expires_at = EXCLUDED.expires_at
WHERE tenant_leases.expires_at <= $5
   OR tenant_leases.holder = EXCLUDED.holder
RETURNING token
";

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    /// Leased tenant.
    pub tenant_id: TenantId,
    /// Token identifying this acquisition.
    pub token: Uuid,
    /// Instance holding the lease.
    pub holder: String,
    /// When the lease lapses if not released.
    pub expires_at: DateTime<Utc>,
}

/// Distributed, expiring tenant lease.
#[async_trait]
pub trait TenantLease: Send + Sync {
    /// Tries to take the lease. Returns `None` if another holder has it.
    async fn try_acquire(&self, tenant_id: TenantId) -> Result<Option<LeaseToken>, DbErr>;

    /// Releases a lease. Releasing an expired or taken-over lease is a no-op.
    async fn release(&self, lease: &LeaseToken) -> Result<(), DbErr>;
}

/// `TenantLease` backed by the `tenant_leases` table.
#[derive(Debug, Clone)]
pub struct PgTenantLease {
    db: DatabaseConnection,
    holder: String,
    ttl: Duration,
}

impl PgTenantLease {
    /// Creates a lease provider for `holder` with the given TTL.
    #[must_use]
    pub fn new(db: DatabaseConnection, holder: impl Into<String>, ttl: Duration) -> Self {
        Self {
            db,
            holder: holder.into(),
            ttl,
        }
    }
}

#[async_trait]
impl TenantLease for PgTenantLease {
    async fn try_acquire(&self, tenant_id: TenantId) -> Result<Option<LeaseToken>, DbErr> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let token = Uuid::new_v4();

        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                ACQUIRE_SQL,
                [
                    tenant_id.into_inner().into(),
                    self.holder.clone().into(),
                    token.into(),
                    expires_at.into(),
                    now.into(),
                ],
            ))
            .await?;

        Ok(row.map(|_| LeaseToken {
            tenant_id,
            token,
            holder: self.holder.clone(),
            expires_at,
        }))
    }

    async fn release(&self, lease: &LeaseToken) -> Result<(), DbErr> {
        tenant_leases::Entity::delete_many()
            .filter(tenant_leases::Column::BusinessId.eq(lease.tenant_id.into_inner()))
            .filter(tenant_leases::Column::Token.eq(lease.token))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
