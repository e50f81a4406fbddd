use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stock-keeping unit. `code` is globally unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub quantity_per_box: i32,
    pub safety_stock: i32,
    pub reorder_point: i32,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub standard_cost: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// `"CODE - Name"`, the form used in conflict reports.
    pub fn label(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::current_inventory::Entity")]
    CurrentInventory,
    #[sea_orm(has_many = "super::inventory_transaction::Entity")]
    InventoryTransaction,
    #[sea_orm(has_many = "super::stock_count_detail::Entity")]
    StockCountDetail,
    #[sea_orm(has_many = "super::part_location::Entity")]
    PartLocation,
}

impl Related<super::current_inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CurrentInventory.def()
    }
}

impl Related<super::inventory_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryTransaction.def()
    }
}

impl Related<super::stock_count_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockCountDetail.def()
    }
}

impl Related<super::warehouse_location::Entity> for Entity {
    fn to() -> RelationDef {
        super::part_location::Relation::WarehouseLocation.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::part_location::Relation::Part.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
