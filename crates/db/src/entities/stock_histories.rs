//! `SeaORM` Entity for stock_histories table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_histories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub product_type: String,
    pub batch_number: String,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub unit_cost: Decimal,
    pub reference_type: String,
    pub reference_id: String,
    pub transaction_date: Date,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub is_reversal: bool,
    pub reverses_id: Option<Uuid>,
    pub reversed_by_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
