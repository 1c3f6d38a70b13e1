//! `SeaORM` Entity for outbox_records table.

use super::sea_orm_active_enums::{ProcessingStatus, PublishStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outbox_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub reference_type: String,
    pub reference_id: String,
    pub action: String,
    pub message_id: String,
    pub correlation_id: String,
    pub effective_date: Date,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub publish_status: PublishStatus,
    pub publish_attempts: i32,
    pub next_publish_attempt_at: Option<DateTimeWithTimeZone>,
    pub publish_lock_token: Option<Uuid>,
    pub publish_locked_until: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_publish_error: Option<String>,
    pub published_at: Option<DateTimeWithTimeZone>,
    pub is_processed: bool,
    pub processing_status: Option<ProcessingStatus>,
    pub process_attempts: i32,
    pub next_process_attempt_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_process_error: Option<String>,
    pub process_lock_token: Option<Uuid>,
    pub process_locked_until: Option<DateTimeWithTimeZone>,
    pub processed_at: Option<DateTimeWithTimeZone>,
    pub compensation_pending: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::businesses::Entity",
        from = "Column::BusinessId",
        to = "super::businesses::Column::Id"
    )]
    Businesses,
}

impl Related<super::businesses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Businesses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
