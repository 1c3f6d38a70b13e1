//! `SeaORM` Entity for stock_summaries table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub business_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub warehouse_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_type: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub batch_number: String,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub on_hand_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((24, 6)))")]
    pub stock_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub average_cost: Decimal,
    pub last_transaction_date: Option<Date>,
    pub negative_dips: i32,
    pub rebuilt_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
