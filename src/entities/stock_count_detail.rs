use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One part within a stock count. `system_quantity` is frozen when the row is
/// created; `variance_quantity` is always derived from `counted_quantity`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_count_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub stock_count_id: i32,
    pub part_id: i32,
    pub system_quantity: i32,
    pub counted_quantity: Option<i32>,
    pub variance_quantity: i32,
    pub notes: Option<String>,
    pub counted_at: Option<DateTime<Utc>>,
}

/// `counted - system`, or zero while the row is uncounted.
pub fn variance(system_quantity: i32, counted_quantity: Option<i32>) -> i32 {
    counted_quantity
        .map(|counted| counted - system_quantity)
        .unwrap_or(0)
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_count::Entity",
        from = "Column::StockCountId",
        to = "super::stock_count::Column::Id"
    )]
    StockCount,
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id"
    )]
    Part,
}

impl Related<super::stock_count::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockCount.def()
    }
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
