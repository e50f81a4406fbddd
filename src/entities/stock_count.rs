use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `planning -> counting -> completed`, or `cancelled` from either open state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StockCountStatus {
    #[sea_orm(string_value = "planning")]
    Planning,
    #[sea_orm(string_value = "counting")]
    Counting,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl StockCountStatus {
    /// Counts still accepting entries.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Planning | Self::Counting)
    }
}

impl fmt::Display for StockCountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockCountStatus::Planning => write!(f, "planning"),
            StockCountStatus::Counting => write!(f, "counting"),
            StockCountStatus::Completed => write!(f, "completed"),
            StockCountStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::EnumString,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StockCountType {
    #[default]
    #[sea_orm(string_value = "full")]
    Full,
    #[sea_orm(string_value = "cycle")]
    Cycle,
    #[sea_orm(string_value = "spot")]
    Spot,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_counts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub count_number: String,
    pub warehouse_id: i32,
    pub count_date: DateTime<Utc>,
    pub status: StockCountStatus,
    pub count_type: StockCountType,
    pub description: Option<String>,
    pub counted_by: Option<String>,
    pub verified_by: Option<String>,
    pub total_items: i32,
    pub variance_items: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
    #[sea_orm(has_many = "super::stock_count_detail::Entity")]
    StockCountDetail,
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl Related<super::stock_count_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockCountDetail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
