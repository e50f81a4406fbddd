use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    clock::Clock,
    db::DbPool,
    entities::{current_inventory, inventory_transaction, part, warehouse},
    errors::ServiceError,
    services::{
        ledger::{ensure_part, hydrate_levels, StockLevel},
        ServiceSettings,
    },
};

/// A balance at or below its part's reorder point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockItem {
    #[serde(flatten)]
    pub stock: StockLevel,
    /// `available - reorder_point`; the most negative rows sort first.
    pub deficit: i32,
    pub shortage: i32,
    pub suggested_order: i32,
}

impl LowStockItem {
    fn from_level(stock: StockLevel) -> Self {
        let deficit = stock.available_quantity - stock.reorder_point;
        let shortage = (-deficit).max(0);
        let suggested_order = shortage.max(stock.safety_stock.saturating_mul(2));
        Self {
            stock,
            deficit,
            shortage,
            suggested_order,
        }
    }
}

/// Keeps rows with `available <= reorder_point`, most deficient first and
/// ties broken by part code.
pub fn low_stock_rows(levels: Vec<StockLevel>) -> Vec<LowStockItem> {
    let mut rows: Vec<LowStockItem> = levels
        .into_iter()
        .filter(|level| level.available_quantity <= level.reorder_point)
        .map(LowStockItem::from_level)
        .collect();
    rows.sort_by(|a, b| {
        a.deficit
            .cmp(&b.deficit)
            .then_with(|| a.stock.part_code.cmp(&b.stock.part_code))
            .then_with(|| a.stock.warehouse_code.cmp(&b.stock.warehouse_code))
    });
    rows
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub part_id: Option<i32>,
    pub warehouse_id: Option<i32>,
    pub limit: Option<u64>,
}

/// A ledger row with the codes a reader needs to make sense of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: inventory_transaction::Model,
    pub part_code: String,
    pub part_name: String,
    pub warehouse_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub part_id: i32,
    pub warehouse_id: Option<i32>,
    pub window_days: u32,
    pub since: DateTime<Utc>,
    /// Sum of positive deltas.
    pub total_in: i64,
    /// Sum of the magnitudes of negative deltas.
    pub total_out: i64,
    pub transaction_count: usize,
}

/// `(total_in, total_out, count)` over a delta sequence.
pub fn summarize<I>(deltas: I) -> (i64, i64, usize)
where
    I: IntoIterator<Item = i32>,
{
    deltas
        .into_iter()
        .fold((0i64, 0i64, 0usize), |(total_in, total_out, count), delta| {
            let delta = i64::from(delta);
            if delta >= 0 {
                (total_in + delta, total_out, count + 1)
            } else {
                (total_in, total_out - delta, count + 1)
            }
        })
}

/// Read-only views over the ledger and catalog.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
    clock: Arc<dyn Clock>,
    settings: Arc<ServiceSettings>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>, clock: Arc<dyn Clock>, settings: Arc<ServiceSettings>) -> Self {
        Self {
            db_pool,
            clock,
            settings,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_low_stock_items(
        &self,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<LowStockItem>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = current_inventory::Entity::find();
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(current_inventory::Column::WarehouseId.eq(warehouse_id));
        }
        let rows = query.all(db).await?;

        let items = low_stock_rows(hydrate_levels(db, rows).await?);
        debug!(items = items.len(), "Low stock items computed");
        Ok(items)
    }

    /// Newest first, capped at the query limit or the configured default.
    #[instrument(skip(self))]
    pub async fn get_transactions(
        &self,
        query: TransactionQuery,
    ) -> Result<Vec<TransactionView>, ServiceError> {
        let db = self.db_pool.as_ref();
        let limit = query.limit.unwrap_or(self.settings.transaction_list_limit);
        if limit == 0 {
            return Err(ServiceError::ValidationError(
                "limit must be greater than zero".to_string(),
            ));
        }

        let mut select = inventory_transaction::Entity::find();
        if let Some(part_id) = query.part_id {
            select = select.filter(inventory_transaction::Column::PartId.eq(part_id));
        }
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(inventory_transaction::Column::WarehouseId.eq(warehouse_id));
        }
        let rows = select
            .order_by_desc(inventory_transaction::Column::TransactionDate)
            .order_by_desc(inventory_transaction::Column::Id)
            .limit(limit)
            .all(db)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let part_ids: Vec<i32> = rows.iter().map(|row| row.part_id).collect();
        let warehouse_ids: Vec<i32> = rows.iter().map(|row| row.warehouse_id).collect();
        let parts: HashMap<i32, part::Model> = part::Entity::find()
            .filter(part::Column::Id.is_in(part_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let warehouses: HashMap<i32, String> = warehouse::Entity::find()
            .filter(warehouse::Column::Id.is_in(warehouse_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|w| (w.id, w.code))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|transaction| {
                let part = parts.get(&transaction.part_id)?;
                let warehouse_code = warehouses.get(&transaction.warehouse_id)?.clone();
                Some(TransactionView {
                    part_code: part.code.clone(),
                    part_name: part.name.clone(),
                    warehouse_code,
                    transaction,
                })
            })
            .collect())
    }

    /// Inbound and outbound totals over the trailing window.
    #[instrument(skip(self))]
    pub async fn get_transaction_summary(
        &self,
        part_id: i32,
        warehouse_id: Option<i32>,
        window_days: Option<u32>,
    ) -> Result<TransactionSummary, ServiceError> {
        let window_days = window_days.unwrap_or(self.settings.transaction_summary_days);
        if window_days == 0 {
            return Err(ServiceError::ValidationError(
                "window must be at least one day".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        ensure_part(db, part_id).await?;

        let since = self.clock.now() - Duration::days(i64::from(window_days));
        let mut select = inventory_transaction::Entity::find()
            .select_only()
            .column(inventory_transaction::Column::Quantity)
            .filter(inventory_transaction::Column::PartId.eq(part_id))
            .filter(inventory_transaction::Column::TransactionDate.gte(since));
        if let Some(warehouse_id) = warehouse_id {
            select = select.filter(inventory_transaction::Column::WarehouseId.eq(warehouse_id));
        }
        let deltas: Vec<i32> = select.into_tuple().all(db).await?;

        let (total_in, total_out, transaction_count) = summarize(deltas);
        Ok(TransactionSummary {
            part_id,
            warehouse_id,
            window_days,
            since,
            total_in,
            total_out,
            transaction_count,
        })
    }
}
