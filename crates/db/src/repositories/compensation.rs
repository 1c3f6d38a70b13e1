//! Hand-off of DEAD records whose documents must go back to draft.

use async_trait::async_trait;
use chrono::Utc;
use ledgerline_core::event::ReferenceType;
use ledgerline_shared::types::{OutboxRecordId, TenantId};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use uuid::Uuid;

use crate::entities::{compensation_requests, sea_orm_active_enums::CompensationStatus};

/// A record that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The DEAD outbox record.
    pub record_id: OutboxRecordId,
    /// Owning business.
    pub tenant_id: TenantId,
    /// Kind of document.
    pub reference_type: ReferenceType,
    /// Document id.
    pub reference_id: String,
    /// Last processing error.
    pub reason: String,
}

/// Reverts the source document of a DEAD record.
#[async_trait]
pub trait DeadLetterCompensator: Send + Sync {
    /// Requests compensation. Returns false if the reference type needs none.
    async fn compensate(&self, dead: &DeadLetter) -> Result<bool, DbErr>;
}

/// Writes durable compensation requests for the document owner to pick up.
#[derive(Debug, Clone)]
pub struct CompensationRequestWriter {
    db: DatabaseConnection,
}

impl CompensationRequestWriter {
    /// Creates a new compensation writer.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeadLetterCompensator for CompensationRequestWriter {
    async fn compensate(&self, dead: &DeadLetter) -> Result<bool, DbErr> {
        if !dead.reference_type.requires_compensation() {
            return Ok(false);
        }

        let now = Utc::now().into();
        let request = compensation_requests::ActiveModel {
            id: Set(Uuid::now_v7()),
            business_id: Set(dead.tenant_id.into_inner()),
            outbox_record_id: Set(dead.record_id.into_inner()),
            reference_type: Set(dead.reference_type.as_str().to_string()),
            reference_id: Set(dead.reference_id.clone()),
            reason: Set(dead.reason.clone()),
            status: Set(CompensationStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // One request per record, even if DEAD is reported twice.
        compensation_requests::Entity::insert(request)
            .on_conflict(
                OnConflict::column(compensation_requests::Column::OutboxRecordId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        tracing::warn!(
            tenant_id = %dead.tenant_id,
            reference_type = %dead.reference_type,
            reference_id = %dead.reference_id,
            outbox_record_id = %dead.record_id,
            "Compensation requested for dead outbox record"
        );
        Ok(true)
    }
}
