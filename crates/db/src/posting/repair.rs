//! Operator repairs: manual reversals, stock rebuilds, and DEAD replays.
//!
//! Each repair runs in its own transaction under the tenant's advisory lock,
//! so it serializes with live postings of the same business.

use std::time::Duration;

use chrono::NaiveDate;
use ledgerline_core::ledger::{ReversalEngine, StockKey, StockRebuild};
use ledgerline_core::posting::IdempotencyKey;
use ledgerline_shared::types::{ActorId, JournalId, OutboxRecordId, StockHistoryId, TenantId};
use sea_orm::{DatabaseConnection, TransactionTrait};

use super::error::PostingError;
use super::lock::lock_tenant;
use crate::repositories::{
    BusinessRepository, IdempotencyRepository, JournalRepository, OutboxRepository,
    StockRepository,
};

/// Error types for repairs.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// The journal does not exist for this business.
    #[error("Journal not found: {0}")]
    JournalNotFound(JournalId),

    /// The stock row does not exist for this business.
    #[error("Stock row not found: {0}")]
    StockRowNotFound(StockHistoryId),

    /// The outbox record does not exist.
    #[error("Outbox record not found: {0}")]
    RecordNotFound(OutboxRecordId),

    /// The outbox record is not DEAD.
    #[error("Outbox record {0} is not DEAD")]
    NotDead(OutboxRecordId),

    /// The target was already reversed or is itself a reversal.
    #[error("Nothing to reverse")]
    NothingToReverse,

    /// Posting infrastructure error.
    #[error(transparent)]
    Posting(#[from] PostingError),
}

impl From<sea_orm::DbErr> for RepairError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Posting(PostingError::Database(err))
    }
}

/// Operator-driven ledger repairs.
#[derive(Debug, Clone)]
pub struct LedgerRepair {
    db: DatabaseConnection,
    outbox: OutboxRepository,
    idempotency: IdempotencyRepository,
    businesses: BusinessRepository,
    lock_timeout: Duration,
}

impl LedgerRepair {
    /// Creates a new repair service.
    #[must_use]
    pub fn new(db: DatabaseConnection, outbox: OutboxRepository, lock_timeout: Duration) -> Self {
        Self {
            idempotency: IdempotencyRepository::new(db.clone()),
            businesses: BusinessRepository::new(db.clone()),
            db,
            outbox,
            lock_timeout,
        }
    }

    /// Reverses one journal as the system actor.
    ///
    /// # Errors
    ///
    /// Returns `NothingToReverse` if the journal is already reversed or is a
    /// reversal itself.
    pub async fn reverse_journal(
        &self,
        tenant_id: TenantId,
        journal_id: JournalId,
    ) -> Result<JournalId, RepairError> {
        let txn = self.db.begin().await?;
        lock_tenant(&txn, tenant_id, self.lock_timeout).await?;

        let journal = JournalRepository::find_by_id(&txn, tenant_id, journal_id)
            .await
            .map_err(PostingError::from)?
            .ok_or(RepairError::JournalNotFound(journal_id))?;
        let plan = ReversalEngine::plan_journals(std::slice::from_ref(&journal));
        let Some(reversal_id) = plan.reversals.first().map(|r| r.id) else {
            return Err(RepairError::NothingToReverse);
        };

        JournalRepository::apply_reversal(&txn, &plan, ActorId::SYSTEM)
            .await
            .map_err(PostingError::from)?;
        txn.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            journal_id = %journal_id,
            reversal_id = %reversal_id,
            "Journal reversed by repair"
        );
        Ok(reversal_id)
    }

    /// Reverses one stock row and rebuilds its key.
    ///
    /// # Errors
    ///
    /// Returns `NothingToReverse` if the row is already reversed or is a
    /// reversal itself.
    pub async fn reverse_stock_row(
        &self,
        tenant_id: TenantId,
        row_id: StockHistoryId,
    ) -> Result<StockRebuild, RepairError> {
        let txn = self.db.begin().await?;
        lock_tenant(&txn, tenant_id, self.lock_timeout).await?;

        let row = StockRepository::find_by_id(&txn, tenant_id, row_id)
            .await
            .map_err(PostingError::from)?
            .ok_or(RepairError::StockRowNotFound(row_id))?;
        let plan = ReversalEngine::plan_stock(std::slice::from_ref(&row));
        if plan.reversals.is_empty() {
            return Err(RepairError::NothingToReverse);
        }

        StockRepository::apply_reversal(&txn, &plan)
            .await
            .map_err(PostingError::from)?;
        let rebuild = StockRepository::rebuild(&txn, &row.key, None)
            .await
            .map_err(PostingError::from)?;
        txn.commit().await?;

        tracing::info!(tenant_id = %tenant_id, stock_row_id = %row_id, "Stock row reversed by repair");
        Ok(rebuild)
    }

    /// Rebuilds one stock key from `from`, or from the business migration
    /// date when not given. The migration date is read from the row, not the
    /// cache, so a date moved just before the repair is honored.
    ///
    /// # Errors
    ///
    /// Returns an error if the business is unknown or the rebuild fails.
    pub async fn rebuild_stock(
        &self,
        key: &StockKey,
        from: Option<NaiveDate>,
    ) -> Result<StockRebuild, RepairError> {
        let start = match from {
            Some(date) => Some(date),
            None => {
                self.businesses.invalidate(key.tenant_id).await;
                self.businesses
                    .get(key.tenant_id)
                    .await
                    .map_err(PostingError::from)?
                    .migration_date
            }
        };

        let txn = self.db.begin().await?;
        lock_tenant(&txn, key.tenant_id, self.lock_timeout).await?;
        let rebuild = StockRepository::rebuild(&txn, key, start)
            .await
            .map_err(PostingError::from)?;
        txn.commit().await?;

        tracing::info!(
            stock_key = %key,
            from = ?start,
            on_hand = %rebuild.on_hand,
            negative_dips = rebuild.negative_dips.len(),
            "Stock key rebuilt by repair"
        );
        Ok(rebuild)
    }

    /// Sends a DEAD record back to the processor with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns `NotDead` if the record is in any other state.
    pub async fn replay_dead(&self, record_id: OutboxRecordId) -> Result<(), RepairError> {
        let record = self
            .outbox
            .find_by_id(record_id)
            .await?
            .ok_or(RepairError::RecordNotFound(record_id))?;
        let event = OutboxRepository::decode(&record).map_err(PostingError::from)?;

        if !self.outbox.reset_dead(record_id).await? {
            return Err(RepairError::NotDead(record_id));
        }
        let key_reset = self
            .idempotency
            .reset(&IdempotencyKey::for_event(&event))
            .await?;

        tracing::info!(
            outbox_record_id = %record_id,
            tenant_id = %event.tenant_id,
            message_id = %event.message_id,
            key_reset,
            "DEAD record replayed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::event::EventError;

    #[test]
    fn test_db_error_maps_through_posting_error() {
        let err = RepairError::from(sea_orm::DbErr::Custom("boom".to_string()));
        assert!(matches!(
            err,
            RepairError::Posting(PostingError::Database(_))
        ));
    }

    #[test]
    fn test_malformed_record_surfaces_event_error() {
        let err = RepairError::from(PostingError::from(EventError::MissingIdentifier("tenant_id")));
        assert!(err.to_string().contains("tenant_id"));
    }
}
