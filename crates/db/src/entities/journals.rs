//! `SeaORM` Entity for journals table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "journals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub reference_type: String,
    pub reference_id: String,
    pub transaction_date: Date,
    pub currency: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub is_reversal: bool,
    pub reverses_journal_id: Option<Uuid>,
    pub reversed_by_journal_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::account_transactions::Entity")]
    AccountTransactions,
}

impl Related<super::account_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
