//! Accounting period lookups for the posting gate.

use ledgerline_core::posting::{AccountingPeriod, PeriodLockConfig};
use ledgerline_shared::types::TenantId;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{accounting_periods, businesses};

/// Accounting period repository.
pub struct PeriodRepository;

impl PeriodRepository {
    /// Loads the lock date and periods of a business on `conn`.
    ///
    /// Read inside the posting transaction so a period closed concurrently is
    /// seen by the next event that takes the tenant lock.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails. Returns `None` if the business
    /// does not exist.
    pub async fn load_config<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
    ) -> Result<Option<PeriodLockConfig>, DbErr> {
        let Some(business) = businesses::Entity::find_by_id(tenant_id.into_inner())
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        let periods = accounting_periods::Entity::find()
            .filter(accounting_periods::Column::BusinessId.eq(tenant_id.into_inner()))
            .order_by_asc(accounting_periods::Column::StartDate)
            .all(conn)
            .await?
            .into_iter()
            .map(|p| AccountingPeriod {
                start_date: p.start_date,
                end_date: p.end_date,
                status: p.status.into(),
            })
            .collect();

        Ok(Some(PeriodLockConfig {
            lock_date: business.lock_date,
            periods,
        }))
    }
}
