//! Journal repository: append journals and flip reversal links.
//!
//! Rows are never updated except for `reversed_by_*` links, and those only
//! from NULL to a value.

use chrono::Utc;
use ledgerline_core::event::ReferenceType;
use ledgerline_core::ledger::{JournalReversalPlan, LedgerError, PostedJournal, PostedLine};
use ledgerline_shared::types::{AccountTransactionId, ActorId, JournalId, TenantId};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{account_transactions, journals};

/// Error types for ledger storage.
#[derive(Debug, thiserror::Error)]
pub enum LedgerStoreError {
    /// A stored row cannot be mapped back to a ledger type.
    #[error("Corrupt ledger row {id}: {reason}")]
    Corrupt {
        /// Row id.
        id: uuid::Uuid,
        /// What was wrong.
        reason: String,
    },

    /// A reversal link was already set by someone else.
    #[error("Row {0} was already reversed")]
    AlreadyReversed(uuid::Uuid),

    /// Ledger validation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub(crate) fn parse_reference_type(
    id: uuid::Uuid,
    raw: &str,
) -> Result<ReferenceType, LedgerStoreError> {
    raw.parse::<ReferenceType>()
        .map_err(|e| LedgerStoreError::Corrupt {
            id,
            reason: e.to_string(),
        })
}

/// Journal repository.
pub struct JournalRepository;

impl JournalRepository {
    /// Appends a journal and its legs.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails.
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        journal: &PostedJournal,
        created_by: ActorId,
    ) -> Result<(), DbErr> {
        let now = Utc::now();

        let header = journals::ActiveModel {
            id: Set(journal.id.into_inner()),
            business_id: Set(journal.tenant_id.into_inner()),
            branch_id: Set(journal.branch_id),
            reference_type: Set(journal.reference_type.as_str().to_string()),
            reference_id: Set(journal.reference_id.clone()),
            transaction_date: Set(journal.transaction_date),
            currency: Set(journal.currency.clone()),
            description: Set(journal.description.clone()),
            is_reversal: Set(journal.is_reversal),
            reverses_journal_id: Set(journal.reverses_journal_id.map(JournalId::into_inner)),
            reversed_by_journal_id: Set(None),
            created_by: Set(created_by.into_inner()),
            created_at: Set(now.into()),
        };
        journals::Entity::insert(header)
            .exec_without_returning(conn)
            .await?;

        let lines = journal.lines.iter().map(|line| account_transactions::ActiveModel {
            id: Set(line.id.into_inner()),
            journal_id: Set(journal.id.into_inner()),
            business_id: Set(journal.tenant_id.into_inner()),
            branch_id: Set(journal.branch_id),
            account_id: Set(line.account_id),
            reference_type: Set(journal.reference_type.as_str().to_string()),
            reference_id: Set(journal.reference_id.clone()),
            transaction_date: Set(journal.transaction_date),
            debit: Set(line.debit),
            credit: Set(line.credit),
            description: Set(line.description.clone()),
            is_reversal: Set(line.is_reversal),
            reverses_id: Set(line.reverses_id.map(AccountTransactionId::into_inner)),
            reversed_by_id: Set(None),
            created_at: Set(now.into()),
        });
        account_transactions::Entity::insert_many(lines)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Active (not reversed, not reversal) journals of a reference.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a row is corrupt.
    pub async fn find_active_by_reference<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<PostedJournal>, LedgerStoreError> {
        let rows = journals::Entity::find()
            .filter(journals::Column::BusinessId.eq(tenant_id.into_inner()))
            .filter(journals::Column::ReferenceType.eq(reference_type.as_str()))
            .filter(journals::Column::ReferenceId.eq(reference_id))
            .filter(journals::Column::IsReversal.eq(false))
            .filter(journals::Column::ReversedByJournalId.is_null())
            .order_by_asc(journals::Column::Id)
            .find_with_related(account_transactions::Entity)
            .all(conn)
            .await?;

        rows.into_iter()
            .map(|(header, lines)| to_posted(header, lines))
            .collect()
    }

    /// Finds a journal with its legs.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a row is corrupt.
    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        id: JournalId,
    ) -> Result<Option<PostedJournal>, LedgerStoreError> {
        let Some(header) = journals::Entity::find_by_id(id.into_inner())
            .filter(journals::Column::BusinessId.eq(tenant_id.into_inner()))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };
        let lines = header
            .find_related(account_transactions::Entity)
            .order_by_asc(account_transactions::Column::Id)
            .all(conn)
            .await?;
        to_posted(header, lines).map(Some)
    }

    /// Appends the reversal journals of `plan` and links the originals.
    ///
    /// Returns the number of journals reversed.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyReversed` if an original gained a reversal link in the
    /// meantime, or a database error.
    pub async fn apply_reversal<C: ConnectionTrait>(
        conn: &C,
        plan: &JournalReversalPlan,
        created_by: ActorId,
    ) -> Result<usize, LedgerStoreError> {
        for reversal in &plan.reversals {
            Self::insert(conn, reversal, created_by).await?;

            if let Some(original) = reversal.reverses_journal_id {
                let result = journals::Entity::update_many()
                    .col_expr(
                        journals::Column::ReversedByJournalId,
                        Expr::value(reversal.id.into_inner()),
                    )
                    .filter(journals::Column::Id.eq(original.into_inner()))
                    .filter(journals::Column::ReversedByJournalId.is_null())
                    .exec(conn)
                    .await?;
                if result.rows_affected == 0 {
                    return Err(LedgerStoreError::AlreadyReversed(original.into_inner()));
                }
            }

            for line in &reversal.lines {
                let Some(original) = line.reverses_id else {
                    continue;
                };
                let result = account_transactions::Entity::update_many()
                    .col_expr(
                        account_transactions::Column::ReversedById,
                        Expr::value(line.id.into_inner()),
                    )
                    .filter(account_transactions::Column::Id.eq(original.into_inner()))
                    .filter(account_transactions::Column::ReversedById.is_null())
                    .exec(conn)
                    .await?;
                if result.rows_affected == 0 {
                    return Err(LedgerStoreError::AlreadyReversed(original.into_inner()));
                }
            }
        }
        Ok(plan.reversals.len())
    }
}

fn to_posted(
    header: journals::Model,
    lines: Vec<account_transactions::Model>,
) -> Result<PostedJournal, LedgerStoreError> {
    let reference_type = parse_reference_type(header.id, &header.reference_type)?;
    let id = JournalId::from_uuid(header.id);
    let lines = lines
        .into_iter()
        .map(|line| PostedLine {
            id: AccountTransactionId::from_uuid(line.id),
            journal_id: id,
            account_id: line.account_id,
            debit: line.debit,
            credit: line.credit,
            description: line.description,
            is_reversal: line.is_reversal,
            reverses_id: line.reverses_id.map(AccountTransactionId::from_uuid),
            reversed_by_id: line.reversed_by_id.map(AccountTransactionId::from_uuid),
        })
        .collect();

    Ok(PostedJournal {
        id,
        tenant_id: TenantId::from_uuid(header.business_id),
        branch_id: header.branch_id,
        reference_type,
        reference_id: header.reference_id,
        transaction_date: header.transaction_date,
        currency: header.currency,
        description: header.description,
        is_reversal: header.is_reversal,
        reverses_journal_id: header.reverses_journal_id.map(JournalId::from_uuid),
        reversed_by_journal_id: header.reversed_by_journal_id.map(JournalId::from_uuid),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn header(reference_type: &str) -> journals::Model {
        journals::Model {
            id: Uuid::now_v7(),
            business_id: Uuid::now_v7(),
            branch_id: None,
            reference_type: reference_type.to_string(),
            reference_id: "100".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            currency: "USD".to_string(),
            description: None,
            is_reversal: false,
            reverses_journal_id: None,
            reversed_by_journal_id: None,
            created_by: Uuid::nil(),
            created_at: Utc::now().into(),
        }
    }

    fn leg(header: &journals::Model, debit: Decimal, credit: Decimal) -> account_transactions::Model {
        account_transactions::Model {
            id: Uuid::now_v7(),
            journal_id: header.id,
            business_id: header.business_id,
            branch_id: None,
            account_id: Uuid::new_v4(),
            reference_type: header.reference_type.clone(),
            reference_id: header.reference_id.clone(),
            transaction_date: header.transaction_date,
            debit,
            credit,
            description: None,
            is_reversal: false,
            reverses_id: None,
            reversed_by_id: None,
            created_at: header.created_at,
        }
    }

    #[test]
    fn test_to_posted_maps_legs() {
        let header = header("Invoice");
        let lines = vec![leg(&header, dec!(10), dec!(0)), leg(&header, dec!(0), dec!(10))];
        let journal = to_posted(header.clone(), lines).unwrap();
        assert_eq!(journal.id.into_inner(), header.id);
        assert_eq!(journal.reference_type, ReferenceType::Invoice);
        assert_eq!(journal.lines.len(), 2);
        assert!(journal.is_active());
        assert_eq!(journal.net(), dec!(0));
    }

    #[test]
    fn test_unknown_reference_type_is_corrupt() {
        let header = header("Quote");
        let result = to_posted(header, Vec::new());
        assert!(matches!(result, Err(LedgerStoreError::Corrupt { .. })));
    }
}
