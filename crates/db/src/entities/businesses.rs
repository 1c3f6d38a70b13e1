//! `SeaORM` Entity for businesses table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "businesses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub base_currency: String,
    pub timezone: String,
    pub migration_date: Option<Date>,
    pub lock_date: Option<Date>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::accounting_periods::Entity")]
    AccountingPeriods,
    #[sea_orm(has_many = "super::outbox_records::Entity")]
    OutboxRecords,
}

impl Related<super::accounting_periods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountingPeriods.def()
    }
}

impl Related<super::outbox_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OutboxRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
