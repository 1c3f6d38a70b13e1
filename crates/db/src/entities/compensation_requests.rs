//! `SeaORM` Entity for compensation_requests table.

use super::sea_orm_active_enums::CompensationStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "compensation_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    #[sea_orm(unique)]
    pub outbox_record_id: Uuid,
    pub reference_type: String,
    pub reference_id: String,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub status: CompensationStatus,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::outbox_records::Entity",
        from = "Column::OutboxRecordId",
        to = "super::outbox_records::Column::Id"
    )]
    OutboxRecords,
}

impl Related<super::outbox_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OutboxRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
