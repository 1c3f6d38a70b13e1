//! Posting routines: what an event does to the ledger.
//!
//! A routine runs inside the posting transaction, after the tenant lock, the
//! idempotency check and the posting gate. It only appends rows and flips
//! reversal links.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ledgerline_core::event::{LedgerEvent, ProcessingContext, ReferenceType};
use ledgerline_core::ledger::{
    JournalDraft, JournalLine, ReversalEngine, StockKey, StockMovement, DEFAULT_PRODUCT_TYPE,
};
use ledgerline_core::posting::HandlerRegistry;
use sea_orm::DatabaseTransaction;
use serde::Deserialize;
use uuid::Uuid;

use super::error::PostingError;
use crate::repositories::{BusinessRepository, JournalRepository, StockRepository};

/// Rows written by one posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingSummary {
    /// Journals appended.
    pub journals_posted: usize,
    /// Journals reversed.
    pub journals_reversed: usize,
    /// Stock rows appended.
    pub stock_rows_posted: usize,
    /// Stock rows reversed.
    pub stock_rows_reversed: usize,
    /// Stock keys whose summaries were rebuilt.
    pub stock_keys_rebuilt: usize,
}

/// Applies one kind of event to the ledger.
#[async_trait]
pub trait PostingRoutine: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Posts `event` on `txn`.
    async fn post(
        &self,
        txn: &DatabaseTransaction,
        event: &LedgerEvent,
        ctx: &ProcessingContext,
    ) -> Result<PostingSummary, PostingError>;
}

/// Registry type used by the pipeline.
pub type RoutineRegistry = HandlerRegistry<dyn PostingRoutine>;

/// Builds a registry covering every reference type with the stock routines.
#[must_use]
pub fn default_routines(businesses: BusinessRepository) -> RoutineRegistry {
    let document: Arc<dyn PostingRoutine> = Arc::new(DocumentPostingRoutine::new(businesses.clone()));
    let reconcile: Arc<dyn PostingRoutine> = Arc::new(ReconcileRoutine::new(businesses));

    let mut registry = RoutineRegistry::new();
    registry
        .register_all(
            ReferenceType::ALL
                .into_iter()
                .filter(|rt| *rt != ReferenceType::Reconcile),
            &document,
        )
        .register(ReferenceType::Reconcile, reconcile);
    registry
}

/// Document fields read from the event payload.
#[derive(Debug, Default)]
struct DocumentFields {
    journal: Vec<JournalLine>,
    stock: Vec<StockMovement>,
    branch_id: Option<Uuid>,
    currency: Option<String>,
    description: Option<String>,
}

impl DocumentFields {
    fn read(event: &LedgerEvent) -> Result<Self, PostingError> {
        Ok(Self {
            journal: event.field("journal")?.unwrap_or_default(),
            stock: event.field("stock")?.unwrap_or_default(),
            branch_id: event.field("branch_id")?,
            currency: event.field("currency")?,
            description: event.field("description")?,
        })
    }
}

/// Generic routine for document events.
///
/// Reads `journal` lines and `stock` movements from the payload. `create`
/// posts them; `update` reverses the reference's active rows first; `void`
/// and `delete` only reverse.
#[derive(Debug, Clone)]
pub struct DocumentPostingRoutine {
    businesses: BusinessRepository,
}

impl DocumentPostingRoutine {
    /// Creates the routine.
    #[must_use]
    pub const fn new(businesses: BusinessRepository) -> Self {
        Self { businesses }
    }
}

#[async_trait]
impl PostingRoutine for DocumentPostingRoutine {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn post(
        &self,
        txn: &DatabaseTransaction,
        event: &LedgerEvent,
        ctx: &ProcessingContext,
    ) -> Result<PostingSummary, PostingError> {
        let fields = DocumentFields::read(event)?;
        let mut summary = PostingSummary::default();
        let mut touched: BTreeSet<StockKey> = BTreeSet::new();

        if event.action.reverses_existing() {
            let journals = JournalRepository::find_active_by_reference(
                txn,
                event.tenant_id,
                event.reference_type,
                &event.reference_id,
            )
            .await?;
            let plan = ReversalEngine::plan_journals(&journals);
            summary.journals_reversed =
                JournalRepository::apply_reversal(txn, &plan, ctx.actor_id).await?;

            let rows = StockRepository::find_active_by_reference(
                txn,
                event.tenant_id,
                event.reference_type,
                &event.reference_id,
            )
            .await?;
            let plan = ReversalEngine::plan_stock(&rows);
            touched.extend(plan.reversals.iter().map(|r| r.key.clone()));
            summary.stock_rows_reversed = StockRepository::apply_reversal(txn, &plan).await?;
        }

        if event.action.posts_new() {
            if !fields.journal.is_empty() {
                let currency = match fields.currency {
                    Some(currency) => currency,
                    None => self.businesses.get(event.tenant_id).await?.base_currency.clone(),
                };
                let journal = JournalDraft {
                    tenant_id: event.tenant_id,
                    branch_id: fields.branch_id,
                    reference_type: event.reference_type,
                    reference_id: event.reference_id.clone(),
                    transaction_date: event.effective_date,
                    currency,
                    description: fields.description.clone(),
                    lines: fields.journal,
                }
                .into_posted()?;
                JournalRepository::insert(txn, &journal, ctx.actor_id).await?;
                summary.journals_posted = 1;
            }

            if !fields.stock.is_empty() {
                StockMovement::validate_all(&fields.stock)?;
                let rows: Vec<_> = fields
                    .stock
                    .into_iter()
                    .map(|m| {
                        m.into_row(
                            event.tenant_id,
                            event.reference_type,
                            &event.reference_id,
                            event.effective_date,
                        )
                    })
                    .collect();
                touched.extend(rows.iter().map(|r| r.key.clone()));
                StockRepository::insert_rows(txn, &rows).await?;
                summary.stock_rows_posted = rows.len();
            }
        }

        for key in &touched {
            StockRepository::rebuild(txn, key, None).await?;
        }
        summary.stock_keys_rebuilt = touched.len();

        tracing::debug!(
            routine = self.name(),
            action = event.action.as_str(),
            journals_posted = summary.journals_posted,
            journals_reversed = summary.journals_reversed,
            stock_rows_posted = summary.stock_rows_posted,
            stock_rows_reversed = summary.stock_rows_reversed,
            "Document posted"
        );
        Ok(summary)
    }
}

/// A stock key named in a reconcile payload.
#[derive(Debug, Clone, Deserialize)]
struct StockKeyRef {
    warehouse_id: Uuid,
    product_id: Uuid,
    #[serde(default = "default_product_type")]
    product_type: String,
    #[serde(default)]
    batch_number: String,
}

fn default_product_type() -> String {
    DEFAULT_PRODUCT_TYPE.to_string()
}

/// Drift correction. Posts optional correcting journal lines and rebuilds
/// the stock keys named in `keys`, starting from `from` or the business
/// migration date. Not subject to the posting gate.
#[derive(Debug, Clone)]
pub struct ReconcileRoutine {
    businesses: BusinessRepository,
}

impl ReconcileRoutine {
    /// Creates the routine.
    #[must_use]
    pub const fn new(businesses: BusinessRepository) -> Self {
        Self { businesses }
    }
}

#[async_trait]
impl PostingRoutine for ReconcileRoutine {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn post(
        &self,
        txn: &DatabaseTransaction,
        event: &LedgerEvent,
        ctx: &ProcessingContext,
    ) -> Result<PostingSummary, PostingError> {
        let fields = DocumentFields::read(event)?;
        let keys: Vec<StockKeyRef> = event.field("keys")?.unwrap_or_default();
        let from: Option<NaiveDate> = event.field("from")?;
        let business = self.businesses.get(event.tenant_id).await?;
        let mut summary = PostingSummary::default();

        if !fields.journal.is_empty() {
            let journal = JournalDraft {
                tenant_id: event.tenant_id,
                branch_id: fields.branch_id,
                reference_type: event.reference_type,
                reference_id: event.reference_id.clone(),
                transaction_date: event.effective_date,
                currency: fields
                    .currency
                    .unwrap_or_else(|| business.base_currency.clone()),
                description: fields.description,
                lines: fields.journal,
            }
            .into_posted()?;
            JournalRepository::insert(txn, &journal, ctx.actor_id).await?;
            summary.journals_posted = 1;
        }

        let start = from.or(business.migration_date);
        for key in keys {
            let key = StockKey {
                tenant_id: event.tenant_id,
                warehouse_id: key.warehouse_id,
                product_id: key.product_id,
                product_type: key.product_type,
                batch_number: key.batch_number,
            };
            StockRepository::rebuild(txn, &key, start).await?;
            summary.stock_keys_rebuilt += 1;
        }

        tracing::info!(
            routine = self.name(),
            journals_posted = summary.journals_posted,
            stock_keys_rebuilt = summary.stock_keys_rebuilt,
            "Reconcile applied"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_shared::types::TenantId;
    use serde_json::json;

    fn event(fields: serde_json::Value) -> LedgerEvent {
        let mut value = json!({
            "tenant_id": TenantId::new(),
            "reference_type": "Invoice",
            "reference_id": "100",
            "message_id": "m1",
            "effective_date": "2026-03-01"
        });
        if let (Some(target), serde_json::Value::Object(extra)) = (value.as_object_mut(), fields) {
            target.extend(extra);
        }
        LedgerEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_document_fields_default_to_empty() {
        let fields = DocumentFields::read(&event(json!({}))).unwrap();
        assert!(fields.journal.is_empty());
        assert!(fields.stock.is_empty());
        assert!(fields.currency.is_none());
    }

    #[test]
    fn test_document_fields_read_lines_and_movements() {
        let fields = DocumentFields::read(&event(json!({
            "currency": "EUR",
            "journal": [
                {"account_id": Uuid::new_v4(), "debit": "10"},
                {"account_id": Uuid::new_v4(), "credit": "10"}
            ],
            "stock": [
                {"warehouse_id": Uuid::new_v4(), "product_id": Uuid::new_v4(), "qty": "-2", "unit_cost": "5"}
            ]
        })))
        .unwrap();
        assert_eq!(fields.journal.len(), 2);
        assert_eq!(fields.stock.len(), 1);
        assert_eq!(fields.stock[0].product_type, DEFAULT_PRODUCT_TYPE);
        assert_eq!(fields.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_bad_field_is_malformed() {
        let result = DocumentFields::read(&event(json!({ "journal": "not-a-list" })));
        assert!(matches!(result, Err(PostingError::Malformed(_))));
    }

    #[test]
    fn test_stock_key_ref_defaults() {
        let key: StockKeyRef = serde_json::from_value(json!({
            "warehouse_id": Uuid::new_v4(),
            "product_id": Uuid::new_v4()
        }))
        .unwrap();
        assert_eq!(key.product_type, "goods");
        assert_eq!(key.batch_number, "");
    }
}
