use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reference type stamped on adjustments posted by a completed stock count.
pub const REFERENCE_COUNT: &str = "COUNT";
/// Reference type used when the caller does not name one.
pub const REFERENCE_MANUAL: &str = "MANUAL";

/// Movement tags stored on every ledger row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TransactionType {
    #[sea_orm(string_value = "IN_PURCHASE")]
    InPurchase,
    #[sea_orm(string_value = "IN_TRANSFER")]
    InTransfer,
    #[sea_orm(string_value = "IN_RETURN")]
    InReturn,
    #[sea_orm(string_value = "OUT_ISSUE")]
    OutIssue,
    #[sea_orm(string_value = "OUT_TRANSFER")]
    OutTransfer,
    #[sea_orm(string_value = "OUT_SCRAP")]
    OutScrap,
    #[sea_orm(string_value = "ADJUST")]
    Adjust,
}

impl TransactionType {
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::InPurchase | Self::InTransfer | Self::InReturn)
    }

    pub fn is_outbound(self) -> bool {
        matches!(self, Self::OutIssue | Self::OutTransfer | Self::OutScrap)
    }

    /// Whether a signed delta is legal for this tag. Zero is always accepted.
    pub fn accepts(self, delta: i32) -> bool {
        if self.is_inbound() {
            delta >= 0
        } else if self.is_outbound() {
            delta <= 0
        } else {
            true
        }
    }
}

/// Append-only movement record. Rows are never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub part_id: i32,
    pub warehouse_id: i32,
    pub transaction_type: TransactionType,
    /// Raw signed delta as requested, before any zero floor.
    pub quantity: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub unit_cost: Decimal,
    pub notes: Option<String>,
    pub created_by: String,
    pub transaction_date: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id"
    )]
    Part,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
