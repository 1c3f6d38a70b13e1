//! Idempotency key repository.
//!
//! The SUCCEEDED write runs on the posting transaction so it commits or rolls
//! back with the ledger rows. The FAILED write runs on its own connection
//! after the posting transaction has rolled back.

use chrono::Utc;
use ledgerline_core::posting::{IdempotencyKey, IdempotencyRecord};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    Set, Statement,
};

use crate::entities::{idempotency_keys, sea_orm_active_enums::IdempotencyStatus};

const MARK_FAILED_SQL: &str = r"
INSERT INTO idempotency_keys (business_id, handler, message_id, status, attempts, last_error, created_at, updated_at)
VALUES ($1, $2, $3, 'FAILED', 1, $4, now(), now())
ON CONFLICT (business_id, handler, message_id) DO UPDATE
SET attempts = idempotency_keys.attempts + 1,
    last_error = EXCLUDED.last_error,
    updated_at = now()
WHERE idempotency_keys.status <> 'SUCCEEDED'
RETURNING attempts
";

/// Idempotency key repository.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    db: DatabaseConnection,
}

impl IdempotencyRepository {
    /// Creates a new idempotency repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Looks up a key on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>, DbErr> {
        let model = idempotency_keys::Entity::find()
            .filter(idempotency_keys::Column::BusinessId.eq(key.tenant_id.into_inner()))
            .filter(idempotency_keys::Column::Handler.eq(key.handler.as_str()))
            .filter(idempotency_keys::Column::MessageId.eq(key.message_id.as_str()))
            .one(conn)
            .await?;

        Ok(model.map(|m| IdempotencyRecord {
            status: m.status.into(),
            attempts: u32::try_from(m.attempts).unwrap_or(0),
            last_error: m.last_error,
        }))
    }

    /// Marks a key SUCCEEDED on `conn`, normally the posting transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn mark_succeeded<C: ConnectionTrait>(
        conn: &C,
        key: &IdempotencyKey,
    ) -> Result<(), DbErr> {
        let now = Utc::now().into();
        let model = idempotency_keys::ActiveModel {
            business_id: Set(key.tenant_id.into_inner()),
            handler: Set(key.handler.as_str().to_string()),
            message_id: Set(key.message_id.clone()),
            status: Set(IdempotencyStatus::Succeeded),
            attempts: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        idempotency_keys::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    idempotency_keys::Column::BusinessId,
                    idempotency_keys::Column::Handler,
                    idempotency_keys::Column::MessageId,
                ])
                .update_columns([
                    idempotency_keys::Column::Status,
                    idempotency_keys::Column::LastError,
                    idempotency_keys::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Records a failed attempt and returns the new attempt count.
    ///
    /// Returns `None` if the key is already SUCCEEDED; a late failure never
    /// downgrades it.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        error: &str,
    ) -> Result<Option<u32>, DbErr> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                MARK_FAILED_SQL,
                [
                    key.tenant_id.into_inner().into(),
                    key.handler.as_str().into(),
                    key.message_id.as_str().into(),
                    error.into(),
                ],
            ))
            .await?;

        row.map(|r| r.try_get::<i32>("", "attempts"))
            .transpose()
            .map(|attempts| attempts.map(|a| u32::try_from(a).unwrap_or(0)))
    }

    /// Deletes a FAILED key so the message can be retried from scratch.
    ///
    /// Returns false if no FAILED key existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset(&self, key: &IdempotencyKey) -> Result<bool, DbErr> {
        let result = idempotency_keys::Entity::delete_many()
            .filter(idempotency_keys::Column::BusinessId.eq(key.tenant_id.into_inner()))
            .filter(idempotency_keys::Column::Handler.eq(key.handler.as_str()))
            .filter(idempotency_keys::Column::MessageId.eq(key.message_id.as_str()))
            .filter(idempotency_keys::Column::Status.eq(IdempotencyStatus::Failed))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
