//! Outbox repository: enqueue, claim, and settle outbox records.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so concurrent dispatchers and
//! processors never take the same row. Every claimed row gets its own lock
//! token; settling a row checks the token, so a worker whose claim expired
//! and was taken over cannot overwrite the new owner's result.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ledgerline_core::event::{EventError, LedgerEvent, ReferenceType};
use ledgerline_core::outbox::{
    Claim, ClaimToken, FailureOutcome, ProcessingState, PublishLifecycle, PublishOutcome,
    PublishPolicy, PublishState, RetryController, RetryPolicy, SuccessOutcome,
};
use ledgerline_shared::types::{OutboxRecordId, TenantId};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{
    outbox_records,
    sea_orm_active_enums::{ProcessingStatus, PublishStatus},
};

/// Error types for outbox operations.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// Outbox record not found.
    #[error("Outbox record not found: {0}")]
    NotFound(OutboxRecordId),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// A row returned by a claim, with the token that owns it.
#[derive(Debug, Clone)]
pub struct ClaimedRecord {
    /// The claimed row.
    pub record: outbox_records::Model,
    /// Token written by the claim.
    pub token: ClaimToken,
}

impl ClaimedRecord {
    /// Typed id of the claimed row.
    #[must_use]
    pub fn id(&self) -> OutboxRecordId {
        OutboxRecordId::from_uuid(self.record.id)
    }

    /// Decodes the stored event.
    pub fn event(&self) -> Result<LedgerEvent, EventError> {
        OutboxRepository::decode(&self.record)
    }
}

const CLAIM_FOR_PUBLISH_SQL: &str = r"
WITH claimable AS (
    SELECT id
    FROM outbox_records
    WHERE (publish_status = 'PENDING'
            AND (next_publish_attempt_at IS NULL OR next_publish_attempt_at <= $1))
       OR (publish_status = 'FAILED' AND next_publish_attempt_at <= $1)
       OR (publish_status = 'PUBLISHING'
            AND (publish_locked_until IS NULL OR publish_locked_until <= $1))
    ORDER BY created_at
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE outbox_records o
SET publish_status = 'PUBLISHING',
    publish_lock_token = gen_random_uuid(),
    publish_locked_until = $3,
    updated_at = $1
FROM claimable
WHERE o.id = claimable.id
RETURNING o.*
";

const CLAIM_FOR_PROCESSING_SQL: &str = r"
WITH claimable AS (
    SELECT id
    FROM outbox_records
    WHERE is_processed = false
      AND ((processing_status IS NULL OR processing_status = 'FAILED')
            AND (next_process_attempt_at IS NULL OR next_process_attempt_at <= $1)
        OR (processing_status = 'PROCESSING'
            AND (process_locked_until IS NULL OR process_locked_until <= $1)))
    ORDER BY created_at
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE outbox_records o
SET processing_status = 'PROCESSING',
    process_lock_token = gen_random_uuid(),
    process_locked_until = $3,
    updated_at = $1
FROM claimable
WHERE o.id = claimable.id
RETURNING o.*
";

/// Outbox repository.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    db: DatabaseConnection,
    publish: PublishLifecycle,
    retry: RetryController,
}

impl OutboxRepository {
    /// Creates a new outbox repository with default policies.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_policies(db, PublishPolicy::default(), RetryPolicy::default())
    }

    /// Creates a new outbox repository with explicit policies.
    #[must_use]
    pub const fn with_policies(
        db: DatabaseConnection,
        publish: PublishPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            publish: PublishLifecycle::new(publish),
            retry: RetryController::new(retry),
        }
    }

    /// Retry controller used for processing outcomes.
    #[must_use]
    pub const fn retry(&self) -> &RetryController {
        &self.retry
    }

    /// Writes an event to the outbox on `conn`.
    ///
    /// Call this inside the producer's own transaction so the record commits
    /// with the business change. Re-enqueueing the same
    /// (tenant, message id) returns the existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn enqueue<C: ConnectionTrait>(
        conn: &C,
        event: &LedgerEvent,
    ) -> Result<outbox_records::Model, DbErr> {
        let now = Utc::now().into();
        let record = outbox_records::ActiveModel {
            id: Set(OutboxRecordId::new().into_inner()),
            business_id: Set(event.tenant_id.into_inner()),
            reference_type: Set(event.reference_type.as_str().to_string()),
            reference_id: Set(event.reference_id.clone()),
            action: Set(event.action.as_str().to_string()),
            message_id: Set(event.message_id.clone()),
            correlation_id: Set(event.correlation_id.clone()),
            effective_date: Set(event.effective_date),
            payload: Set(event.to_value()),
            publish_status: Set(PublishStatus::Pending),
            publish_attempts: Set(0),
            next_publish_attempt_at: Set(None),
            publish_lock_token: Set(None),
            publish_locked_until: Set(None),
            last_publish_error: Set(None),
            published_at: Set(None),
            is_processed: Set(false),
            processing_status: Set(None),
            process_attempts: Set(0),
            next_process_attempt_at: Set(None),
            last_process_error: Set(None),
            process_lock_token: Set(None),
            process_locked_until: Set(None),
            processed_at: Set(None),
            compensation_pending: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        outbox_records::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    outbox_records::Column::BusinessId,
                    outbox_records::Column::MessageId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        outbox_records::Entity::find()
            .filter(outbox_records::Column::BusinessId.eq(event.tenant_id.into_inner()))
            .filter(outbox_records::Column::MessageId.eq(event.message_id.as_str()))
            .one(conn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("outbox message {}", event.message_id)))
    }

    /// Decodes the event stored in a record.
    pub fn decode(record: &outbox_records::Model) -> Result<LedgerEvent, EventError> {
        LedgerEvent::from_value(record.payload.clone())
    }

    /// Finds a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(
        &self,
        id: OutboxRecordId,
    ) -> Result<Option<outbox_records::Model>, DbErr> {
        outbox_records::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
    }

    /// Finds a record by its logical message identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_message(
        &self,
        tenant_id: TenantId,
        message_id: &str,
    ) -> Result<Option<outbox_records::Model>, DbErr> {
        outbox_records::Entity::find()
            .filter(outbox_records::Column::BusinessId.eq(tenant_id.into_inner()))
            .filter(outbox_records::Column::MessageId.eq(message_id))
            .one(&self.db)
            .await
    }

    // ========================================================================
    // Publish lifecycle
    // ========================================================================

    /// Claims up to `batch_size` rows for publishing.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim statement fails.
    pub async fn claim_for_publish(&self, batch_size: u64) -> Result<Vec<ClaimedRecord>, DbErr> {
        let ttl = self.publish.policy().lock_ttl;
        let rows = self.claim(CLAIM_FOR_PUBLISH_SQL, batch_size, ttl).await?;
        Ok(rows
            .into_iter()
            .filter_map(|record| {
                let token = ClaimToken(record.publish_lock_token?);
                Some(ClaimedRecord { record, token })
            })
            .collect())
    }

    /// Records an acknowledged publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_published(
        &self,
        id: OutboxRecordId,
        token: ClaimToken,
    ) -> Result<PublishOutcome, OutboxError> {
        self.apply_publish(id, |lifecycle, state, now| {
            lifecycle.on_sent(state, token, now)
        })
        .await
    }

    /// Records a failed publish and schedules the next attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_publish_failure(
        &self,
        id: OutboxRecordId,
        token: ClaimToken,
        error: &str,
    ) -> Result<PublishOutcome, OutboxError> {
        self.apply_publish(id, |lifecycle, state, now| {
            lifecycle.on_failed(state, token, now, error)
        })
        .await
    }

    async fn apply_publish<F>(&self, id: OutboxRecordId, apply: F) -> Result<PublishOutcome, OutboxError>
    where
        F: FnOnce(&PublishLifecycle, &mut PublishState, DateTime<Utc>) -> PublishOutcome,
    {
        let txn = self.db.begin().await?;
        let record = outbox_records::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(OutboxError::NotFound(id))?;

        let now = Utc::now();
        let mut state = publish_state(&record);
        let outcome = apply(&self.publish, &mut state, now);
        if outcome == PublishOutcome::StaleClaim {
            txn.commit().await?;
            return Ok(outcome);
        }

        let mut active: outbox_records::ActiveModel = record.into();
        active.publish_status = Set(state.status.into());
        active.publish_attempts = Set(to_db_count(state.attempts));
        active.next_publish_attempt_at = Set(state.next_attempt_at.map(Into::into));
        active.publish_lock_token = Set(state.claim.map(|c| c.token.0));
        active.publish_locked_until = Set(state.claim.map(|c| c.locked_until.into()));
        active.last_publish_error = Set(state.last_error);
        active.published_at = Set(state.published_at.map(Into::into));
        active.updated_at = Set(now.into());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(outcome)
    }

    // ========================================================================
    // Processing lifecycle
    // ========================================================================

    /// Claims up to `batch_size` unprocessed rows for direct processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim statement fails.
    pub async fn claim_for_processing(
        &self,
        batch_size: u64,
        claim_ttl: Duration,
    ) -> Result<Vec<ClaimedRecord>, DbErr> {
        let rows = self.claim(CLAIM_FOR_PROCESSING_SQL, batch_size, claim_ttl).await?;
        Ok(rows
            .into_iter()
            .filter_map(|record| {
                let token = ClaimToken(record.process_lock_token?);
                Some(ClaimedRecord { record, token })
            })
            .collect())
    }

    /// Records a successful posting or a duplicate.
    ///
    /// With a token, nothing is written unless the caller still owns the
    /// claim; `None` is returned in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_success(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
    ) -> Result<Option<SuccessOutcome>, OutboxError> {
        self.apply_processing(id, token, |retry, state, now| retry.on_success(state, now))
            .await
    }

    /// Records a permanent drop (malformed payload or gate rejection).
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_drop(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
        reason: &str,
    ) -> Result<Option<SuccessOutcome>, OutboxError> {
        self.apply_processing(id, token, |retry, state, now| {
            retry.on_drop(state, now, reason)
        })
        .await
    }

    /// Records a failed attempt, moving the record to DEAD at the limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_failure(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
        error: &str,
    ) -> Result<Option<FailureOutcome>, OutboxError> {
        self.apply_processing(id, token, |retry, state, now| {
            retry.on_failure(state, now, error)
        })
        .await
    }

    /// Moves a record straight to DEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the update fails.
    pub async fn record_exhausted(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
        error: &str,
    ) -> Result<Option<FailureOutcome>, OutboxError> {
        self.apply_processing(id, token, |retry, state, now| {
            retry.on_exhausted(state, now, error)
        })
        .await
    }

    /// Resets a DEAD record to new so the processor picks it up again.
    ///
    /// Returns false if the record is not DEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn reset_dead(&self, id: OutboxRecordId) -> Result<bool, DbErr> {
        let result = outbox_records::Entity::update_many()
            .col_expr(
                outbox_records::Column::ProcessingStatus,
                Option::<ProcessingStatus>::None.into(),
            )
            .col_expr(outbox_records::Column::IsProcessed, false.into())
            .col_expr(outbox_records::Column::ProcessAttempts, 0.into())
            .col_expr(
                outbox_records::Column::NextProcessAttemptAt,
                Option::<DateTime<Utc>>::None.into(),
            )
            .col_expr(outbox_records::Column::ProcessedAt, Option::<DateTime<Utc>>::None.into())
            .col_expr(outbox_records::Column::ProcessLockToken, Option::<Uuid>::None.into())
            .col_expr(
                outbox_records::Column::ProcessLockedUntil,
                Option::<DateTime<Utc>>::None.into(),
            )
            .col_expr(outbox_records::Column::CompensationPending, false.into())
            .col_expr(outbox_records::Column::UpdatedAt, Utc::now().into())
            .filter(outbox_records::Column::Id.eq(id.into_inner()))
            .filter(outbox_records::Column::ProcessingStatus.eq(ProcessingStatus::Dead))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// DEAD records whose compensation has not been accepted yet, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn pending_compensations(
        &self,
        limit: u64,
    ) -> Result<Vec<outbox_records::Model>, DbErr> {
        outbox_records::Entity::find()
            .filter(outbox_records::Column::CompensationPending.eq(true))
            .order_by_asc(outbox_records::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Marks the compensation of a DEAD record as accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn clear_compensation_pending(&self, id: OutboxRecordId) -> Result<(), DbErr> {
        outbox_records::Entity::update_many()
            .col_expr(outbox_records::Column::CompensationPending, false.into())
            .col_expr(outbox_records::Column::UpdatedAt, Utc::now().into())
            .filter(outbox_records::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn apply_processing<T, F>(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
        apply: F,
    ) -> Result<Option<T>, OutboxError>
    where
        F: FnOnce(&RetryController, &mut ProcessingState, DateTime<Utc>) -> T,
    {
        let txn = self.db.begin().await?;
        let record = outbox_records::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(OutboxError::NotFound(id))?;

        if let Some(token) = token
            && record.process_lock_token != Some(token.0)
        {
            txn.commit().await?;
            return Ok(None);
        }

        let now = Utc::now();
        let mut state = processing_state(&record);
        let outcome = apply(&self.retry, &mut state, now);
        let compensation_due = starts_compensation(&record, &state);

        let mut active: outbox_records::ActiveModel = record.into();
        active.processing_status = Set(state.status.map(Into::into));
        active.process_attempts = Set(to_db_count(state.attempts));
        active.next_process_attempt_at = Set(state.next_attempt_at.map(Into::into));
        active.last_process_error = Set(state.last_error);
        active.is_processed = Set(state.is_processed);
        active.processed_at = Set(state.processed_at.map(Into::into));
        active.process_lock_token = Set(None);
        active.process_locked_until = Set(None);
        if compensation_due {
            active.compensation_pending = Set(true);
        }
        active.updated_at = Set(now.into());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(outcome))
    }

    async fn claim(
        &self,
        sql: &str,
        batch_size: u64,
        ttl: Duration,
    ) -> Result<Vec<outbox_records::Model>, DbErr> {
        let now = Utc::now();
        let locked_until = now
            .checked_add_signed(TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);

        outbox_records::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [now.into(), limit.into(), locked_until.into()],
            ))
            .all(&self.db)
            .await
    }
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn from_db_count(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

fn publish_state(record: &outbox_records::Model) -> PublishState {
    let claim = record
        .publish_lock_token
        .zip(record.publish_locked_until)
        .map(|(token, until)| Claim {
            token: ClaimToken(token),
            locked_until: until.with_timezone(&Utc),
        });
    PublishState {
        status: record.publish_status.into(),
        attempts: from_db_count(record.publish_attempts),
        next_attempt_at: record.next_publish_attempt_at.map(|t| t.with_timezone(&Utc)),
        claim,
        last_error: record.last_publish_error.clone(),
        published_at: record.published_at.map(|t| t.with_timezone(&Utc)),
    }
}

/// True when this transition makes the record DEAD and its document kind
/// must be reverted.
fn starts_compensation(record: &outbox_records::Model, next: &ProcessingState) -> bool {
    record.processing_status != Some(ProcessingStatus::Dead)
        && next.status.map(ProcessingStatus::from) == Some(ProcessingStatus::Dead)
        && record
            .reference_type
            .parse::<ReferenceType>()
            .is_ok_and(ReferenceType::requires_compensation)
}

fn processing_state(record: &outbox_records::Model) -> ProcessingState {
    ProcessingState {
        status: record.processing_status.map(Into::into),
        attempts: from_db_count(record.process_attempts),
        next_attempt_at: record.next_process_attempt_at.map(|t| t.with_timezone(&Utc)),
        last_error: record.last_process_error.clone(),
        is_processed: record.is_processed,
        processed_at: record.processed_at.map(|t| t.with_timezone(&Utc)),
    }
}
