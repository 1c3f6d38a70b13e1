//! Stock history repository and summary rebuild.

use chrono::{NaiveDate, Utc};
use ledgerline_core::event::ReferenceType;
use ledgerline_core::ledger::{RebuildEngine, StockKey, StockRebuild, StockReversalPlan, StockRow};
use ledgerline_shared::types::{StockHistoryId, TenantId};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};

use super::journal::{parse_reference_type, LedgerStoreError};
use crate::entities::{stock_histories, stock_summaries};

/// Stock history repository.
pub struct StockRepository;

impl StockRepository {
    /// Appends stock rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_rows<C: ConnectionTrait>(conn: &C, rows: &[StockRow]) -> Result<(), DbErr> {
        if rows.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let models = rows.iter().map(|row| stock_histories::ActiveModel {
            id: Set(row.id.into_inner()),
            business_id: Set(row.key.tenant_id.into_inner()),
            warehouse_id: Set(row.key.warehouse_id),
            product_id: Set(row.key.product_id),
            product_type: Set(row.key.product_type.clone()),
            batch_number: Set(row.key.batch_number.clone()),
            qty: Set(row.qty),
            unit_cost: Set(row.unit_cost),
            reference_type: Set(row.reference_type.as_str().to_string()),
            reference_id: Set(row.reference_id.clone()),
            transaction_date: Set(row.transaction_date),
            description: Set(row.description.clone()),
            is_reversal: Set(row.is_reversal),
            reverses_id: Set(row.reverses_id.map(StockHistoryId::into_inner)),
            reversed_by_id: Set(None),
            created_at: Set(now.into()),
        });
        stock_histories::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Active stock rows of a reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn find_active_by_reference<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<StockRow>, LedgerStoreError> {
        stock_histories::Entity::find()
            .filter(stock_histories::Column::BusinessId.eq(tenant_id.into_inner()))
            .filter(stock_histories::Column::ReferenceType.eq(reference_type.as_str()))
            .filter(stock_histories::Column::ReferenceId.eq(reference_id))
            .filter(stock_histories::Column::IsReversal.eq(false))
            .filter(stock_histories::Column::ReversedById.is_null())
            .order_by_asc(stock_histories::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(to_row)
            .collect()
    }

    /// Finds one stock row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        id: StockHistoryId,
    ) -> Result<Option<StockRow>, LedgerStoreError> {
        stock_histories::Entity::find_by_id(id.into_inner())
            .filter(stock_histories::Column::BusinessId.eq(tenant_id.into_inner()))
            .one(conn)
            .await?
            .map(to_row)
            .transpose()
    }

    /// Every row of a stock key, reversed and reversal rows included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn rows_for_key<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
    ) -> Result<Vec<StockRow>, LedgerStoreError> {
        stock_histories::Entity::find()
            .filter(stock_histories::Column::BusinessId.eq(key.tenant_id.into_inner()))
            .filter(stock_histories::Column::WarehouseId.eq(key.warehouse_id))
            .filter(stock_histories::Column::ProductId.eq(key.product_id))
            .filter(stock_histories::Column::ProductType.eq(key.product_type.as_str()))
            .filter(stock_histories::Column::BatchNumber.eq(key.batch_number.as_str()))
            .order_by_asc(stock_histories::Column::TransactionDate)
            .order_by_asc(stock_histories::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(to_row)
            .collect()
    }

    /// Appends the reversal rows of `plan` and links the originals.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyReversed` if an original was linked in the meantime,
    /// or a database error.
    pub async fn apply_reversal<C: ConnectionTrait>(
        conn: &C,
        plan: &StockReversalPlan,
    ) -> Result<usize, LedgerStoreError> {
        Self::insert_rows(conn, &plan.reversals).await?;

        for reversal in &plan.reversals {
            let Some(original) = reversal.reverses_id else {
                continue;
            };
            let result = stock_histories::Entity::update_many()
                .col_expr(
                    stock_histories::Column::ReversedById,
                    Expr::value(reversal.id.into_inner()),
                )
                .filter(stock_histories::Column::Id.eq(original.into_inner()))
                .filter(stock_histories::Column::ReversedById.is_null())
                .exec(conn)
                .await?;
            if result.rows_affected == 0 {
                return Err(LedgerStoreError::AlreadyReversed(original.into_inner()));
            }
        }
        Ok(plan.reversals.len())
    }

    /// Recomputes a stock key and rewrites its summary row.
    ///
    /// Rows dated before `from` only feed the opening balance.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or the rows cannot be folded.
    pub async fn rebuild<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
        from: Option<NaiveDate>,
    ) -> Result<StockRebuild, LedgerStoreError> {
        let rows = Self::rows_for_key(conn, key).await?;
        let rebuild = RebuildEngine::rebuild(key, &rows, from)?;

        if let Some(first) = rebuild.negative_dips.first() {
            tracing::warn!(
                stock_key = %key,
                dips = rebuild.negative_dips.len(),
                first_dip_date = %first.transaction_date,
                "Running stock balance went negative"
            );
        }

        let summary = stock_summaries::ActiveModel {
            business_id: Set(key.tenant_id.into_inner()),
            warehouse_id: Set(key.warehouse_id),
            product_id: Set(key.product_id),
            product_type: Set(key.product_type.clone()),
            batch_number: Set(key.batch_number.clone()),
            on_hand_qty: Set(rebuild.on_hand),
            stock_value: Set(rebuild.stock_value),
            average_cost: Set(rebuild.average_cost),
            last_transaction_date: Set(rebuild.last_transaction_date),
            negative_dips: Set(i32::try_from(rebuild.negative_dips.len()).unwrap_or(i32::MAX)),
            rebuilt_at: Set(Utc::now().into()),
        };
        stock_summaries::Entity::insert(summary)
            .on_conflict(
                OnConflict::columns([
                    stock_summaries::Column::BusinessId,
                    stock_summaries::Column::WarehouseId,
                    stock_summaries::Column::ProductId,
                    stock_summaries::Column::ProductType,
                    stock_summaries::Column::BatchNumber,
                ])
                .update_columns([
                    stock_summaries::Column::OnHandQty,
                    stock_summaries::Column::StockValue,
                    stock_summaries::Column::AverageCost,
                    stock_summaries::Column::LastTransactionDate,
                    stock_summaries::Column::NegativeDips,
                    stock_summaries::Column::RebuiltAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        tracing::debug!(
            stock_key = %key,
            on_hand = %rebuild.on_hand,
            stock_value = %rebuild.stock_value,
            "Stock summary rebuilt"
        );
        Ok(rebuild)
    }

    /// Reads a stored summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn summary<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
    ) -> Result<Option<stock_summaries::Model>, DbErr> {
        stock_summaries::Entity::find_by_id((
            key.tenant_id.into_inner(),
            key.warehouse_id,
            key.product_id,
            key.product_type.clone(),
            key.batch_number.clone(),
        ))
        .one(conn)
        .await
    }
}

fn to_row(model: stock_histories::Model) -> Result<StockRow, LedgerStoreError> {
    let reference_type = parse_reference_type(model.id, &model.reference_type)?;
    Ok(StockRow {
        id: StockHistoryId::from_uuid(model.id),
        key: StockKey {
            tenant_id: TenantId::from_uuid(model.business_id),
            warehouse_id: model.warehouse_id,
            product_id: model.product_id,
            product_type: model.product_type,
            batch_number: model.batch_number,
        },
        qty: model.qty,
        unit_cost: model.unit_cost,
        reference_type,
        reference_id: model.reference_id,
        transaction_date: model.transaction_date,
        description: model.description,
        is_reversal: model.is_reversal,
        reverses_id: model.reverses_id.map(StockHistoryId::from_uuid),
        reversed_by_id: model.reversed_by_id.map(StockHistoryId::from_uuid),
    })
}
