//! The posting pipeline.
//!
//! `apply` is the single entry point used by both delivery paths:
//!
//! 1. resolve the routine for the reference type
//! 2. take the in-process tenant lock (bounded wait), then the best-effort lease
//! 3. open a transaction and take the tenant's advisory lock
//! 4. consult the idempotency key
//! 5. run the posting gate against the periods read inside the transaction
//! 6. run the routine and mark the key SUCCEEDED, then commit
//!
//! Failures are recorded on the idempotency key outside the rolled-back
//! transaction, so the attempt count survives the rollback.
//!
//! A record that turns DEAD is flagged `compensation_pending` in the same
//! transaction. The flag is cleared only after the compensator accepts the
//! request; `retry_pending_compensations` picks up whatever is left.

use std::sync::Arc;
use std::time::Duration;

use ledgerline_core::event::{LedgerEvent, ProcessingContext, ReferenceType};
use ledgerline_core::outbox::{ClaimToken, FailureOutcome, SuccessOutcome};
use ledgerline_core::posting::{
    GateDecision, GateRejection, IdempotencyDecision, IdempotencyKey, PostingGate,
    TenantLockRegistry,
};
use ledgerline_shared::types::{OutboxRecordId, TenantId};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::instrument;

use super::error::{ErrorClass, PostingError};
use super::lock::lock_tenant;
use super::routine::{PostingRoutine, PostingSummary, RoutineRegistry};
use crate::repositories::{
    ClaimedRecord, DeadLetter, DeadLetterCompensator, IdempotencyRepository, OutboxError,
    OutboxRepository, PeriodRepository, TenantLease,
};

/// Default wait for the advisory lock before giving up with a retryable error.
pub const DEFAULT_DB_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for the in-process lock before falling through to the
/// advisory lock.
pub const DEFAULT_LOCAL_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Lock timings for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingSettings {
    /// Wait for the in-process tenant lock.
    pub local_lock_wait: Duration,
    /// `lock_timeout` applied to the advisory lock.
    pub db_lock_timeout: Duration,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            local_lock_wait: DEFAULT_LOCAL_LOCK_WAIT,
            db_lock_timeout: DEFAULT_DB_LOCK_TIMEOUT,
        }
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingOutcome {
    /// The routine ran and its rows committed.
    Posted(PostingSummary),
    /// The idempotency key was already SUCCEEDED; nothing was written.
    Duplicate,
    /// The posting gate refused the event; nothing was written.
    Rejected(GateRejection),
    /// The idempotency key ran out of attempts.
    Exhausted {
        /// Recorded attempts.
        attempts: u32,
    },
}

/// What happened to an outbox record after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// SUCCEEDED (posted or duplicate).
    Succeeded,
    /// SUCCEEDED with an error recorded; the event will not be posted.
    Dropped,
    /// FAILED and scheduled for another attempt.
    Retrying {
        /// Attempts so far.
        attempt: u32,
    },
    /// DEAD.
    Dead {
        /// Attempts made.
        attempts: u32,
    },
    /// The record was already SUCCEEDED or DEAD; nothing changed.
    AlreadyTerminal,
    /// The claim was taken over; nothing was written.
    StaleClaim,
}

/// Applies ledger events exactly once per (tenant, reference type, message).
#[derive(Clone)]
pub struct PostingService {
    db: DatabaseConnection,
    routines: Arc<RoutineRegistry>,
    local_locks: TenantLockRegistry,
    lease: Option<Arc<dyn TenantLease>>,
    outbox: OutboxRepository,
    idempotency: IdempotencyRepository,
    compensator: Option<Arc<dyn DeadLetterCompensator>>,
    settings: PostingSettings,
}

impl PostingService {
    /// Creates a new posting service.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        routines: Arc<RoutineRegistry>,
        outbox: OutboxRepository,
        settings: PostingSettings,
    ) -> Self {
        Self {
            idempotency: IdempotencyRepository::new(db.clone()),
            db,
            routines,
            local_locks: TenantLockRegistry::new(),
            lease: None,
            outbox,
            compensator: None,
            settings,
        }
    }

    /// Adds a distributed tenant lease.
    #[must_use]
    pub fn with_lease(mut self, lease: Arc<dyn TenantLease>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Adds a compensator for DEAD records.
    #[must_use]
    pub fn with_compensator(mut self, compensator: Arc<dyn DeadLetterCompensator>) -> Self {
        self.compensator = Some(compensator);
        self
    }

    /// Outbox repository used to settle records.
    #[must_use]
    pub const fn outbox(&self) -> &OutboxRepository {
        &self.outbox
    }

    /// Applies an event to the ledger.
    ///
    /// # Errors
    ///
    /// Returns the classified error of a failed attempt. The attempt is
    /// recorded on the idempotency key unless the event is malformed.
    #[instrument(
        skip(self, event, ctx),
        fields(
            tenant_id = %event.tenant_id,
            reference_type = %event.reference_type,
            reference_id = %event.reference_id,
            message_id = %event.message_id,
        )
    )]
    pub async fn apply(
        &self,
        event: &LedgerEvent,
        ctx: &ProcessingContext,
    ) -> Result<PostingOutcome, PostingError> {
        event.validate()?;
        let routine = Arc::clone(self.routines.resolve(event.reference_type)?);
        let key = IdempotencyKey::for_event(event);

        let local = self
            .local_locks
            .acquire_timeout(event.tenant_id, self.settings.local_lock_wait)
            .await;
        if local.is_none() {
            tracing::debug!("Local tenant lock busy, relying on the database lock");
        }

        let lease = match &self.lease {
            Some(provider) => match provider.try_acquire(event.tenant_id).await {
                Ok(Some(token)) => Some(token),
                Ok(None) => {
                    tracing::debug!("Tenant lease held elsewhere, relying on the database lock");
                    None
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Tenant lease unavailable");
                    None
                }
            },
            None => None,
        };

        let result = self.apply_locked(routine.as_ref(), event, ctx, &key).await;

        if let (Some(provider), Some(token)) = (&self.lease, &lease)
            && let Err(e) = provider.release(token).await
        {
            tracing::debug!(error = %e, "Failed to release tenant lease");
        }
        drop(local);

        match &result {
            Ok(outcome) => {
                tracing::info!(routine = routine.name(), outcome = ?outcome, "Event applied");
            }
            Err(err) if err.classification() == ErrorClass::Malformed => {
                tracing::warn!(error = %err, code = err.error_code(), "Malformed event");
            }
            Err(err) => {
                let attempts = self
                    .idempotency
                    .mark_failed(&key, &format!("{}: {err}", err.error_code()))
                    .await;
                match attempts {
                    Ok(attempts) => tracing::warn!(
                        error = %err,
                        code = err.error_code(),
                        attempts = ?attempts,
                        "Posting attempt failed"
                    ),
                    Err(e) => tracing::error!(
                        error = %err,
                        record_error = %e,
                        "Posting attempt failed and could not be recorded"
                    ),
                }
            }
        }
        result
    }

    async fn apply_locked(
        &self,
        routine: &dyn PostingRoutine,
        event: &LedgerEvent,
        ctx: &ProcessingContext,
        key: &IdempotencyKey,
    ) -> Result<PostingOutcome, PostingError> {
        let txn = self.db.begin().await?;
        lock_tenant(&txn, event.tenant_id, self.settings.db_lock_timeout).await?;

        let existing = IdempotencyRepository::find(&txn, key).await?;
        let max_attempts = self.outbox.retry().policy().max_attempts;
        match IdempotencyDecision::decide(existing.as_ref(), max_attempts) {
            IdempotencyDecision::AlreadySucceeded => {
                txn.commit().await?;
                tracing::debug!("Idempotency key already succeeded");
                return Ok(PostingOutcome::Duplicate);
            }
            IdempotencyDecision::RetriesExhausted { attempts } => {
                txn.commit().await?;
                return Ok(PostingOutcome::Exhausted { attempts });
            }
            IdempotencyDecision::Proceed { prior_attempts } if prior_attempts > 0 => {
                tracing::debug!(prior_attempts, "Retrying event");
            }
            IdempotencyDecision::Proceed { .. } => {}
        }

        let config = PeriodRepository::load_config(&txn, event.tenant_id)
            .await?
            .ok_or(PostingError::TenantNotFound(event.tenant_id))?;
        match PostingGate::evaluate(event.reference_type, event.effective_date, ctx, &config) {
            GateDecision::Reject(rejection) => {
                txn.rollback().await?;
                tracing::info!(reason = %rejection, "Posting gate rejected event");
                return Ok(PostingOutcome::Rejected(rejection));
            }
            GateDecision::Bypass => tracing::debug!("Posting gate bypassed"),
            GateDecision::Allow => {}
        }

        let summary = routine.post(&txn, event, ctx).await?;
        IdempotencyRepository::mark_succeeded(&txn, key).await?;
        txn.commit().await?;
        Ok(PostingOutcome::Posted(summary))
    }

    /// Applies an event delivered by push and settles its outbox record.
    ///
    /// Settling is best effort: the idempotency key is authoritative, and a
    /// record that cannot be settled here is settled by the next claim.
    ///
    /// # Errors
    ///
    /// Returns the posting error. The caller should ask for redelivery only
    /// when it is retryable.
    pub async fn handle_push(&self, event: &LedgerEvent) -> Result<PostingOutcome, PostingError> {
        let ctx = ProcessingContext::for_event(event);
        let result = self.apply(event, &ctx).await;

        match self.outbox.find_by_message(event.tenant_id, &event.message_id).await {
            Ok(Some(record)) => {
                let id = OutboxRecordId::from_uuid(record.id);
                if let Err(e) = self.settle(id, None, event, &result).await {
                    tracing::warn!(outbox_record_id = %id, error = %e, "Failed to settle outbox record");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to look up outbox record"),
        }
        result
    }

    /// Processes a record claimed by the direct processor.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record cannot be settled.
    pub async fn process_claimed(&self, claimed: &ClaimedRecord) -> Result<Settlement, OutboxError> {
        let id = claimed.id();
        let event = match claimed.event() {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(outbox_record_id = %id, error = %err, "Dropping undecodable outbox record");
                let outcome = self
                    .outbox
                    .record_drop(id, Some(claimed.token), &format!("{}: {err}", err.error_code()))
                    .await?;
                return Ok(success_settlement(outcome, Settlement::Dropped));
            }
        };

        let ctx = ProcessingContext::for_event(&event);
        let result = self.apply(&event, &ctx).await;
        self.settle(id, Some(claimed.token), &event, &result).await
    }

    async fn settle(
        &self,
        id: OutboxRecordId,
        token: Option<ClaimToken>,
        event: &LedgerEvent,
        result: &Result<PostingOutcome, PostingError>,
    ) -> Result<Settlement, OutboxError> {
        match result {
            Ok(PostingOutcome::Posted(_) | PostingOutcome::Duplicate) => {
                let outcome = self.outbox.record_success(id, token).await?;
                Ok(success_settlement(outcome, Settlement::Succeeded))
            }
            Ok(PostingOutcome::Rejected(rejection)) => {
                let outcome = self
                    .outbox
                    .record_drop(id, token, &rejection.to_string())
                    .await?;
                Ok(success_settlement(outcome, Settlement::Dropped))
            }
            Ok(PostingOutcome::Exhausted { attempts }) => {
                let reason = format!("retries exhausted after {attempts} attempts");
                let outcome = self.outbox.record_exhausted(id, token, &reason).await?;
                self.after_failure(id, event, &reason, outcome).await
            }
            Err(err) if err.classification() == ErrorClass::Malformed => {
                let reason = format!("{}: {err}", err.error_code());
                let outcome = self.outbox.record_drop(id, token, &reason).await?;
                Ok(success_settlement(outcome, Settlement::Dropped))
            }
            Err(err) => {
                let reason = format!("{}: {err}", err.error_code());
                let outcome = self.outbox.record_failure(id, token, &reason).await?;
                self.after_failure(id, event, &reason, outcome).await
            }
        }
    }

    async fn after_failure(
        &self,
        id: OutboxRecordId,
        event: &LedgerEvent,
        reason: &str,
        outcome: Option<FailureOutcome>,
    ) -> Result<Settlement, OutboxError> {
        match outcome {
            None => Ok(Settlement::StaleClaim),
            Some(FailureOutcome::AlreadyTerminal(status)) => {
                tracing::debug!(outbox_record_id = %id, status = ?status, "Outbox record already terminal");
                Ok(Settlement::AlreadyTerminal)
            }
            Some(FailureOutcome::Retry {
                attempt,
                next_attempt_at,
            }) => {
                tracing::warn!(
                    outbox_record_id = %id,
                    attempt,
                    next_attempt_at = %next_attempt_at,
                    "Outbox record scheduled for retry"
                );
                Ok(Settlement::Retrying { attempt })
            }
            Some(FailureOutcome::Dead { attempts }) => {
                tracing::error!(
                    outbox_record_id = %id,
                    attempts,
                    reason,
                    "Outbox record is DEAD"
                );
                let dead = DeadLetter {
                    record_id: id,
                    tenant_id: event.tenant_id,
                    reference_type: event.reference_type,
                    reference_id: event.reference_id.clone(),
                    reason: reason.to_string(),
                };
                self.compensate(&dead).await;
                Ok(Settlement::Dead { attempts })
            }
        }
    }

    /// Retries compensation for DEAD records whose request was not accepted.
    ///
    /// Returns the number of requests accepted in this pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending records cannot be listed.
    pub async fn retry_pending_compensations(&self, limit: u64) -> Result<usize, OutboxError> {
        if self.compensator.is_none() {
            return Ok(0);
        }

        let mut accepted = 0;
        for record in self.outbox.pending_compensations(limit).await? {
            let id = OutboxRecordId::from_uuid(record.id);
            let Ok(reference_type) = record.reference_type.parse::<ReferenceType>() else {
                tracing::warn!(outbox_record_id = %id, reference_type = %record.reference_type, "Pending compensation has an unknown reference type");
                continue;
            };
            let dead = DeadLetter {
                record_id: id,
                tenant_id: TenantId::from_uuid(record.business_id),
                reference_type,
                reference_id: record.reference_id,
                reason: record.last_process_error.unwrap_or_default(),
            };
            if self.compensate(&dead).await {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    async fn compensate(&self, dead: &DeadLetter) -> bool {
        let Some(compensator) = &self.compensator else {
            return false;
        };
        if let Err(e) = compensator.compensate(dead).await {
            tracing::error!(
                outbox_record_id = %dead.record_id,
                error = %e,
                "Failed to request compensation, will retry"
            );
            return false;
        }
        // The request is idempotent per record; a failed clear only repeats it.
        if let Err(e) = self.outbox.clear_compensation_pending(dead.record_id).await {
            tracing::warn!(outbox_record_id = %dead.record_id, error = %e, "Failed to clear pending compensation");
        }
        true
    }
}

fn success_settlement(outcome: Option<SuccessOutcome>, settled: Settlement) -> Settlement {
    match outcome {
        None => Settlement::StaleClaim,
        Some(SuccessOutcome::Succeeded) => settled,
        Some(SuccessOutcome::AlreadyTerminal(_)) => Settlement::AlreadyTerminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::outbox::ProcessingStatus;

    #[test]
    fn test_default_settings() {
        let settings = PostingSettings::default();
        assert_eq!(settings.db_lock_timeout, Duration::from_secs(30));
        assert_eq!(settings.local_lock_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_success_settlement_stale_claim() {
        assert_eq!(success_settlement(None, Settlement::Succeeded), Settlement::StaleClaim);
    }

    #[test]
    fn test_success_settlement_keeps_drop() {
        assert_eq!(
            success_settlement(Some(SuccessOutcome::Succeeded), Settlement::Dropped),
            Settlement::Dropped
        );
    }

    #[test]
    fn test_success_settlement_already_terminal() {
        assert_eq!(
            success_settlement(
                Some(SuccessOutcome::AlreadyTerminal(ProcessingStatus::Dead)),
                Settlement::Dropped
            ),
            Settlement::AlreadyTerminal
        );
    }
}
