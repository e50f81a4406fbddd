use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    clock::Clock,
    db::DbPool,
    entities::{
        current_inventory,
        inventory_transaction::{TransactionType, REFERENCE_COUNT},
        part,
        stock_count::{self, StockCountStatus, StockCountType},
        stock_count_detail,
    },
    errors::{ResultExt, ServiceError},
    events::{Event, EventSender},
    services::{
        catalog, clean_text,
        ledger::{
            ensure_part, ensure_warehouse, find_balance, StockLedgerService, StockMovement,
            StockUpdate,
        },
        ImportReport, ServiceSettings,
    },
};

const MAX_NUMBER_ATTEMPTS: usize = 10;
const IMPORT_COUNTED_BY: &str = "import";

/// `{prefix}-{YYYYMMDD}-{suffix}` with the date rendered at the given UTC offset.
pub fn format_count_number(
    prefix: &str,
    now: DateTime<Utc>,
    utc_offset_hours: i32,
    suffix: u16,
) -> String {
    let local = now + Duration::hours(i64::from(utc_offset_hours));
    format!("{}-{}-{}", prefix, local.format("%Y%m%d"), suffix)
}

fn random_suffix() -> u16 {
    rand::thread_rng().gen_range(1000..=9999)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStockCount {
    pub warehouse_id: i32,
    pub count_type: StockCountType,
    pub description: Option<String>,
    pub counted_by: Option<String>,
}

/// Header fields editable while a count is still open. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockCountUpdate {
    pub count_type: Option<StockCountType>,
    pub count_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub counted_by: Option<String>,
}

/// One imported count line, quantity still as raw text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountImportRow {
    pub part_code: String,
    pub counted_quantity: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountDetailView {
    #[serde(flatten)]
    pub detail: stock_count_detail::Model,
    pub part_code: String,
    pub part_name: String,
    pub unit: String,
}

/// A count header with its lines ordered by part code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockCountSheet {
    pub count: stock_count::Model,
    pub details: Vec<CountDetailView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub count: stock_count::Model,
    /// Ledger movements posted for non-zero variances, in part order.
    pub adjustments: Vec<StockMovement>,
}

/// Snapshot-based physical reconciliation. Balances are only ever changed
/// through the ledger.
#[derive(Clone)]
pub struct StockCountService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    settings: Arc<ServiceSettings>,
    ledger: StockLedgerService,
}

impl StockCountService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        settings: Arc<ServiceSettings>,
        ledger: StockLedgerService,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            clock,
            settings,
            ledger,
        }
    }

    /// Creates a `planning` count and freezes every positive balance of the
    /// warehouse as its expected quantities.
    #[instrument(skip(self))]
    pub async fn create_count(&self, input: NewStockCount) -> Result<stock_count::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;

        ensure_warehouse(&txn, input.warehouse_id).await?;
        let now = self.clock.now();
        let count_number = self.unique_count_number(&txn, now).await?;

        let snapshot = current_inventory::Entity::find()
            .filter(current_inventory::Column::WarehouseId.eq(input.warehouse_id))
            .filter(current_inventory::Column::QuantityOnHand.gt(0))
            .order_by_asc(current_inventory::Column::PartId)
            .all(&txn)
            .await?;

        let count = stock_count::ActiveModel {
            count_number: Set(count_number),
            warehouse_id: Set(input.warehouse_id),
            count_date: Set(now),
            status: Set(StockCountStatus::Planning),
            count_type: Set(input.count_type),
            description: Set(clean_text(input.description)),
            counted_by: Set(clean_text(input.counted_by)),
            verified_by: Set(None),
            total_items: Set(snapshot.len() as i32),
            variance_items: Set(0),
            created_at: Set(now),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if !snapshot.is_empty() {
            let details = snapshot.iter().map(|balance| stock_count_detail::ActiveModel {
                stock_count_id: Set(count.id),
                part_id: Set(balance.part_id),
                system_quantity: Set(balance.quantity_on_hand),
                counted_quantity: Set(None),
                variance_quantity: Set(0),
                notes: Set(None),
                counted_at: Set(None),
                ..Default::default()
            });
            stock_count_detail::Entity::insert_many(details)
                .exec(&txn)
                .await?;
        }

        txn.commit().await.map_err_to_service()?;

        info!(
            count_id = count.id,
            count_number = %count.count_number,
            warehouse_id = count.warehouse_id,
            items = snapshot.len(),
            "Stock count created"
        );
        counter!("stockroom.stock_counts.created", 1);
        self.event_sender
            .publish(Event::StockCountCreated {
                count_id: count.id,
                count_number: count.count_number.clone(),
            })
            .await;

        Ok(count)
    }

    async fn unique_count_number<C>(&self, conn: &C, now: DateTime<Utc>) -> Result<String, ServiceError>
    where
        C: ConnectionTrait,
    {
        for _ in 0..MAX_NUMBER_ATTEMPTS {
            let candidate = format_count_number(
                &self.settings.count_number_prefix,
                now,
                self.settings.utc_offset_hours,
                random_suffix(),
            );
            let taken = stock_count::Entity::find()
                .filter(stock_count::Column::CountNumber.eq(candidate.as_str()))
                .count(conn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
            warn!(count_number = %candidate, "Count number collision, retrying");
        }

        Err(ServiceError::InternalError(format!(
            "could not allocate a unique count number after {} attempts",
            MAX_NUMBER_ATTEMPTS
        )))
    }

    /// `planning -> counting`. Returns `false` without changes from any
    /// other state.
    #[instrument(skip(self))]
    pub async fn start_count(&self, id: i32) -> Result<bool, ServiceError> {
        let db = self.db_pool.as_ref();
        let count = load_count(db, id).await?;

        if count.status != StockCountStatus::Planning {
            info!(count_id = id, status = %count.status, "Count not in planning, start ignored");
            return Ok(false);
        }

        let mut active: stock_count::ActiveModel = count.into();
        active.status = Set(StockCountStatus::Counting);
        active.update(db).await?;

        info!(count_id = id, "Stock count started");
        self.event_sender.publish(Event::StockCountStarted(id)).await;
        Ok(true)
    }

    /// Upserts the line for `part_id`. Parts outside the snapshot get a line
    /// whose expected quantity is the live balance at this moment.
    #[instrument(skip(self))]
    pub async fn record_count(
        &self,
        count_id: i32,
        part_id: i32,
        counted_quantity: i32,
        notes: Option<String>,
    ) -> Result<stock_count_detail::Model, ServiceError> {
        check_counted_quantity(counted_quantity)?;

        let txn = self.db_pool.begin().await?;
        let count = lock_open_count(&txn, count_id).await?;
        ensure_part(&txn, part_id).await?;
        let now = self.clock.now();

        let existing = find_detail(&txn, count_id, part_id).await?;
        let detail = match existing {
            Some(detail) => set_counted(&txn, detail, counted_quantity, notes, now).await?,
            None => {
                let system_quantity = find_balance(&txn, part_id, count.warehouse_id)
                    .await?
                    .map(|row| row.quantity_on_hand)
                    .unwrap_or(0);
                let detail = stock_count_detail::ActiveModel {
                    stock_count_id: Set(count_id),
                    part_id: Set(part_id),
                    system_quantity: Set(system_quantity),
                    counted_quantity: Set(Some(counted_quantity)),
                    variance_quantity: Set(stock_count_detail::variance(
                        system_quantity,
                        Some(counted_quantity),
                    )),
                    notes: Set(clean_text(notes)),
                    counted_at: Set(Some(now)),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;

                let total_items = count.total_items + 1;
                let mut header: stock_count::ActiveModel = count.into();
                header.total_items = Set(total_items);
                header.update(&txn).await?;
                detail
            }
        };

        txn.commit().await.map_err_to_service()?;

        info!(
            count_id,
            part_id,
            counted_quantity,
            variance = detail.variance_quantity,
            "Count recorded"
        );
        Ok(detail)
    }

    /// Edits one line by its own id.
    #[instrument(skip(self))]
    pub async fn update_count_detail(
        &self,
        detail_id: i32,
        counted_quantity: i32,
        notes: Option<String>,
    ) -> Result<stock_count_detail::Model, ServiceError> {
        check_counted_quantity(counted_quantity)?;

        let txn = self.db_pool.begin().await?;
        let detail = stock_count_detail::Entity::find_by_id(detail_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Count detail {} not found", detail_id)))?;
        lock_open_count(&txn, detail.stock_count_id).await?;

        let updated = set_counted(&txn, detail, counted_quantity, notes, self.clock.now()).await?;
        txn.commit().await.map_err_to_service()?;
        Ok(updated)
    }

    /// Best-effort bulk entry against lines already on the count. Every good
    /// row commits on its own.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn import_count_data(
        &self,
        count_id: i32,
        rows: Vec<CountImportRow>,
    ) -> Result<ImportReport, ServiceError> {
        let db = self.db_pool.as_ref();
        let count = load_open_count(db, count_id).await?;

        let mut report = ImportReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;

            let part_code = row.part_code.trim();
            if part_code.is_empty() {
                report.reject(row_number, "part code is required");
                continue;
            }

            let part = match catalog::part_by_code(db, part_code).await {
                Ok(part) => part,
                Err(ServiceError::NotFound(_)) => {
                    report.reject(row_number, format!("unknown part code '{}'", part_code));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(detail) = find_detail(db, count.id, part.id).await? else {
                report.reject(
                    row_number,
                    format!("part '{}' is not part of count {}", part_code, count.count_number),
                );
                continue;
            };

            let raw = row.counted_quantity.trim();
            let counted_quantity = match raw.parse::<i32>() {
                Ok(quantity) if quantity >= 0 => quantity,
                Ok(_) => {
                    report.reject(row_number, "counted quantity must not be negative");
                    continue;
                }
                Err(_) => {
                    report.reject(
                        row_number,
                        format!("counted quantity '{}' is not a number", raw),
                    );
                    continue;
                }
            };

            set_counted(db, detail, counted_quantity, row.notes, self.clock.now()).await?;
            report.imported += 1;
        }

        info!(
            count_id,
            imported = report.imported,
            skipped = report.skipped,
            "Count import finished"
        );
        Ok(report)
    }

    /// Opens a fresh full count for the warehouse and imports into it.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn import_count_from_rows(
        &self,
        warehouse_id: i32,
        rows: Vec<CountImportRow>,
    ) -> Result<(stock_count::Model, ImportReport), ServiceError> {
        let count = self
            .create_count(NewStockCount {
                warehouse_id,
                count_type: StockCountType::Full,
                description: None,
                counted_by: Some(IMPORT_COUNTED_BY.to_string()),
            })
            .await?;
        let report = self.import_count_data(count.id, rows).await?;
        Ok((count, report))
    }

    /// Closes the count and, when asked, posts every non-zero variance as an
    /// `ADJUST` movement. Header and adjustments commit together.
    #[instrument(skip(self))]
    pub async fn complete_count(
        &self,
        id: i32,
        verified_by: Option<String>,
        apply_adjustments: bool,
    ) -> Result<CompletionReport, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let count = lock_open_count(&txn, id).await?;

        let details = stock_count_detail::Entity::find()
            .filter(stock_count_detail::Column::StockCountId.eq(id))
            .order_by_asc(stock_count_detail::Column::PartId)
            .all(&txn)
            .await?;
        let total_items = details.len() as i32;
        let variance_items = details
            .iter()
            .filter(|detail| detail.variance_quantity != 0)
            .count() as i32;

        let now = self.clock.now();
        let warehouse_id = count.warehouse_id;
        let mut header: stock_count::ActiveModel = count.into();
        header.status = Set(StockCountStatus::Completed);
        header.verified_by = Set(clean_text(verified_by));
        header.completed_at = Set(Some(now));
        header.total_items = Set(total_items);
        header.variance_items = Set(variance_items);
        let completed = header.update(&txn).await?;

        let mut adjustments = Vec::new();
        if apply_adjustments {
            for detail in details.iter().filter(|detail| detail.variance_quantity != 0) {
                let mut update = StockUpdate::new(
                    detail.part_id,
                    warehouse_id,
                    detail.variance_quantity,
                    TransactionType::Adjust,
                )
                .reference(REFERENCE_COUNT, Some(id))
                .notes(format!(
                    "Stock count {} adjustment (variance {})",
                    completed.count_number, detail.variance_quantity
                ));
                if let Some(verifier) = completed.verified_by.as_deref() {
                    update = update.created_by(verifier);
                }
                adjustments.push(self.ledger.apply(&txn, update).await?);
            }
        }

        txn.commit().await.map_err_to_service()?;

        info!(
            count_id = id,
            total_items,
            variance_items,
            adjustments = adjustments.len(),
            "Stock count completed"
        );
        counter!("stockroom.stock_counts.completed", 1);
        for movement in &adjustments {
            self.ledger.announce(movement).await;
        }
        self.event_sender
            .publish(Event::StockCountCompleted {
                count_id: id,
                variance_items,
                adjustments_posted: adjustments.len(),
            })
            .await;

        Ok(CompletionReport {
            count: completed,
            adjustments,
        })
    }

    /// `planning | counting -> cancelled`. Nothing is posted to the ledger.
    #[instrument(skip(self))]
    pub async fn cancel_count(&self, id: i32) -> Result<stock_count::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let count = lock_open_count(&txn, id).await?;

        let mut active: stock_count::ActiveModel = count.into();
        active.status = Set(StockCountStatus::Cancelled);
        let cancelled = active.update(&txn).await?;
        txn.commit().await.map_err_to_service()?;

        info!(count_id = id, "Stock count cancelled");
        self.event_sender.publish(Event::StockCountCancelled(id)).await;
        Ok(cancelled)
    }

    /// Removes a count and its lines. Only `planning` counts may go.
    #[instrument(skip(self))]
    pub async fn delete_count(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;
        let count = load_count(&txn, id).await?;

        if count.status != StockCountStatus::Planning {
            return Err(ServiceError::InvalidStatus(format!(
                "Stock count {} is {}; only planning counts can be deleted",
                count.count_number, count.status
            )));
        }

        stock_count_detail::Entity::delete_many()
            .filter(stock_count_detail::Column::StockCountId.eq(id))
            .exec(&txn)
            .await?;
        count.delete(&txn).await?;
        txn.commit().await.map_err_to_service()?;

        info!(count_id = id, "Stock count deleted");
        self.event_sender.publish(Event::StockCountDeleted(id)).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_count(
        &self,
        id: i32,
        changes: StockCountUpdate,
    ) -> Result<stock_count::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let count = load_open_count(db, id).await?;

        let mut active: stock_count::ActiveModel = count.into();
        if let Some(count_type) = changes.count_type {
            active.count_type = Set(count_type);
        }
        if let Some(count_date) = changes.count_date {
            active.count_date = Set(count_date);
        }
        if let Some(description) = changes.description {
            active.description = Set(clean_text(Some(description)));
        }
        if let Some(counted_by) = changes.counted_by {
            active.counted_by = Set(clean_text(Some(counted_by)));
        }

        active.update(db).await.map_err(ServiceError::db_error)
    }

    pub async fn get_count(&self, id: i32) -> Result<stock_count::Model, ServiceError> {
        load_count(self.db_pool.as_ref(), id).await
    }

    pub async fn get_count_details(&self, id: i32) -> Result<StockCountSheet, ServiceError> {
        let db = self.db_pool.as_ref();
        let count = load_count(db, id).await?;

        let rows = count
            .find_related(stock_count_detail::Entity)
            .find_also_related(part::Entity)
            .all(db)
            .await?;

        let mut details: Vec<CountDetailView> = rows
            .into_iter()
            .filter_map(|(detail, part)| {
                let part = part?;
                Some(CountDetailView {
                    detail,
                    part_code: part.code,
                    part_name: part.name,
                    unit: part.unit,
                })
            })
            .collect();
        details.sort_by(|a, b| a.part_code.cmp(&b.part_code));

        Ok(StockCountSheet { count, details })
    }

    /// Newest first, optionally for one warehouse.
    pub async fn list_counts(
        &self,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<stock_count::Model>, ServiceError> {
        let mut query = stock_count::Entity::find();
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(stock_count::Column::WarehouseId.eq(warehouse_id));
        }
        query
            .order_by_desc(stock_count::Column::CreatedAt)
            .order_by_desc(stock_count::Column::Id)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

fn check_counted_quantity(counted_quantity: i32) -> Result<(), ServiceError> {
    if counted_quantity < 0 {
        return Err(ServiceError::ValidationError(
            "counted quantity must not be negative".to_string(),
        ));
    }
    Ok(())
}

async fn load_count<C>(conn: &C, id: i32) -> Result<stock_count::Model, ServiceError>
where
    C: ConnectionTrait,
{
    stock_count::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock count {} not found", id)))
}

/// A count that still accepts entries.
async fn load_open_count<C>(conn: &C, id: i32) -> Result<stock_count::Model, ServiceError>
where
    C: ConnectionTrait,
{
    ensure_open(load_count(conn, id).await?)
}

/// Same as [`load_open_count`], holding the header row until the transaction
/// ends so concurrent transitions on one count serialize.
async fn lock_open_count<C>(conn: &C, id: i32) -> Result<stock_count::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let count = stock_count::Entity::find_by_id(id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock count {} not found", id)))?;
    ensure_open(count)
}

fn ensure_open(count: stock_count::Model) -> Result<stock_count::Model, ServiceError> {
    if !count.status.is_open() {
        return Err(ServiceError::InvalidStatus(format!(
            "Stock count {} is already {}",
            count.count_number, count.status
        )));
    }
    Ok(count)
}

async fn find_detail<C>(
    conn: &C,
    count_id: i32,
    part_id: i32,
) -> Result<Option<stock_count_detail::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    stock_count_detail::Entity::find()
        .filter(stock_count_detail::Column::StockCountId.eq(count_id))
        .filter(stock_count_detail::Column::PartId.eq(part_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Stores a counted quantity and re-derives the variance from the frozen
/// system quantity.
async fn set_counted<C>(
    conn: &C,
    detail: stock_count_detail::Model,
    counted_quantity: i32,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<stock_count_detail::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let variance = stock_count_detail::variance(detail.system_quantity, Some(counted_quantity));
    let mut active: stock_count_detail::ActiveModel = detail.into();
    active.counted_quantity = Set(Some(counted_quantity));
    active.variance_quantity = Set(variance);
    active.notes = Set(clean_text(notes));
    active.counted_at = Set(Some(now));
    active.update(conn).await.map_err(ServiceError::db_error)
}
