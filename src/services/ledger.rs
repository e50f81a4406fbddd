use std::{collections::HashMap, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    clock::Clock,
    config::NegativeStockPolicy,
    db::DbPool,
    entities::{
        current_inventory,
        inventory_transaction::{self, TransactionType, REFERENCE_MANUAL},
        part, warehouse,
    },
    errors::{ResultExt, ServiceError},
    events::{Event, EventSender},
    services::{catalog, clean_text, ServiceSettings},
};

const DEFAULT_CREATED_BY: &str = "system";

/// One requested change to a `(part, warehouse)` balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub part_id: i32,
    pub warehouse_id: i32,
    /// Signed delta: positive for inbound, negative for outbound.
    pub quantity_change: i32,
    pub transaction_type: TransactionType,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl StockUpdate {
    pub fn new(
        part_id: i32,
        warehouse_id: i32,
        quantity_change: i32,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            part_id,
            warehouse_id,
            quantity_change,
            transaction_type,
            reference_type: None,
            reference_id: None,
            unit_cost: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn reference(mut self, reference_type: impl Into<String>, reference_id: Option<i32>) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = reference_id;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// Result of a ledger mutation. `applied_change` differs from
/// `requested_change` when the zero floor swallowed part of an outbound delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub transaction: inventory_transaction::Model,
    pub balance: current_inventory::Model,
    pub previous_on_hand: i32,
    pub requested_change: i32,
    pub applied_change: i32,
    pub clamped: bool,
}

/// Operator-facing inbound or outbound request, addressed by part code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementRequest {
    pub part_code: String,
    pub warehouse_id: i32,
    pub quantity: i32,
    /// Raw tag such as `IN_PURCHASE` or `OUT_ISSUE`.
    pub transaction_type: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// A balance row joined with its part and warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub part_id: i32,
    pub part_code: String,
    pub part_name: String,
    pub unit: String,
    pub safety_stock: i32,
    pub reorder_point: i32,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub warehouse_name: String,
    pub quantity_on_hand: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
    pub last_updated: DateTime<Utc>,
}

impl StockLevel {
    fn new(row: current_inventory::Model, part: &part::Model, warehouse: &warehouse::Model) -> Self {
        Self {
            part_id: part.id,
            part_code: part.code.clone(),
            part_name: part.name.clone(),
            unit: part.unit.clone(),
            safety_stock: part.safety_stock,
            reorder_point: part.reorder_point,
            warehouse_id: warehouse.id,
            warehouse_code: warehouse.code.clone(),
            warehouse_name: warehouse.name.clone(),
            quantity_on_hand: row.quantity_on_hand,
            reserved_quantity: row.reserved_quantity,
            available_quantity: row.available_quantity,
            last_updated: row.last_updated,
        }
    }
}

/// Replay of the transaction log against the stored balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub part_id: i32,
    pub warehouse_id: i32,
    pub transaction_count: usize,
    pub replayed_on_hand: i32,
    pub stored_on_hand: Option<i32>,
    pub consistent: bool,
}

/// Clamped-at-zero running sum of a delta sequence, starting from zero.
pub fn replay<I>(deltas: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    deltas
        .into_iter()
        .fold(0i32, |on_hand, delta| on_hand.saturating_add(delta).max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn parse_tag(self, tag: &str) -> Result<TransactionType, ServiceError> {
        let parsed = TransactionType::from_str(tag.trim()).map_err(|_| {
            ServiceError::ValidationError(format!("unknown transaction type '{}'", tag))
        })?;

        let matches = match self {
            Direction::Inbound => parsed.is_inbound(),
            Direction::Outbound => parsed.is_outbound(),
        };
        if matches {
            Ok(parsed)
        } else {
            let label = match self {
                Direction::Inbound => "inbound",
                Direction::Outbound => "outbound",
            };
            Err(ServiceError::ValidationError(format!(
                "{} is not an {} transaction type",
                parsed, label
            )))
        }
    }
}

/// The single writer of `current_inventory`. Every balance change is paired
/// with exactly one `inventory_transactions` row in the same transaction.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    settings: Arc<ServiceSettings>,
}

impl StockLedgerService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        settings: Arc<ServiceSettings>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            clock,
            settings,
        }
    }

    /// Applies a signed delta and appends its ledger row atomically.
    #[instrument(skip(self))]
    pub async fn update_stock(&self, update: StockUpdate) -> Result<StockMovement, ServiceError> {
        let txn = self.db_pool.begin().await?;

        ensure_part(&txn, update.part_id).await?;
        ensure_warehouse(&txn, update.warehouse_id).await?;
        let movement = self.apply(&txn, update).await?;

        txn.commit().await.map_err_to_service()?;
        self.announce(&movement).await;
        Ok(movement)
    }

    /// Receives stock with an `IN_*` tag.
    #[instrument(skip(self))]
    pub async fn stock_in(&self, request: MovementRequest) -> Result<StockMovement, ServiceError> {
        self.move_stock(request, Direction::Inbound).await
    }

    /// Issues stock with an `OUT_*` tag after checking availability.
    #[instrument(skip(self))]
    pub async fn stock_out(&self, request: MovementRequest) -> Result<StockMovement, ServiceError> {
        self.move_stock(request, Direction::Outbound).await
    }

    async fn move_stock(
        &self,
        request: MovementRequest,
        direction: Direction,
    ) -> Result<StockMovement, ServiceError> {
        let transaction_type = direction.parse_tag(&request.transaction_type)?;
        if request.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be greater than zero".to_string(),
            ));
        }
        let part_code = request.part_code.trim();
        if part_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "part code is required".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        let part = catalog::part_by_code(&txn, part_code).await?;
        ensure_warehouse(&txn, request.warehouse_id).await?;

        if direction == Direction::Outbound {
            let available = find_balance(&txn, part.id, request.warehouse_id)
                .await?
                .map(|row| row.available_quantity)
                .unwrap_or(0);
            if available < request.quantity {
                warn!(
                    part_code = %part.code,
                    warehouse_id = request.warehouse_id,
                    available,
                    requested = request.quantity,
                    "Rejecting outbound movement"
                );
                return Err(ServiceError::InsufficientStock {
                    available,
                    requested: request.quantity,
                });
            }
        }

        let quantity_change = match direction {
            Direction::Inbound => request.quantity,
            Direction::Outbound => -request.quantity,
        };
        let update = StockUpdate {
            part_id: part.id,
            warehouse_id: request.warehouse_id,
            quantity_change,
            transaction_type,
            reference_type: clean_text(request.reference_type)
                .or_else(|| Some(REFERENCE_MANUAL.to_string())),
            reference_id: request.reference_id,
            unit_cost: request.unit_cost,
            notes: clean_text(request.notes),
            created_by: clean_text(request.created_by),
        };

        let movement = self.apply(&txn, update).await?;
        txn.commit().await.map_err_to_service()?;
        self.announce(&movement).await;
        Ok(movement)
    }

    /// Balance read-modify-write plus ledger append on an open connection or
    /// transaction. Callers own commit and event publication.
    pub(crate) async fn apply<C>(
        &self,
        conn: &C,
        update: StockUpdate,
    ) -> Result<StockMovement, ServiceError>
    where
        C: ConnectionTrait,
    {
        if !update.transaction_type.accepts(update.quantity_change) {
            return Err(ServiceError::ValidationError(format!(
                "{} does not accept a quantity change of {}",
                update.transaction_type, update.quantity_change
            )));
        }

        let now = self.clock.now();
        let existing = find_balance(conn, update.part_id, update.warehouse_id).await?;
        let (previous_on_hand, previous_available, reserved) = existing
            .as_ref()
            .map(|row| {
                (
                    row.quantity_on_hand,
                    row.available_quantity,
                    row.reserved_quantity,
                )
            })
            .unwrap_or((0, 0, 0));

        let target = previous_on_hand
            .checked_add(update.quantity_change)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "quantity change {} overflows the balance",
                    update.quantity_change
                ))
            })?;

        if target < 0 && self.settings.negative_stock_policy == NegativeStockPolicy::Reject {
            return Err(ServiceError::InsufficientStock {
                available: previous_available,
                requested: -update.quantity_change,
            });
        }

        let on_hand = target.max(0);
        let available = (on_hand - reserved).max(0);

        let balance = match existing {
            Some(row) => {
                let mut active: current_inventory::ActiveModel = row.into();
                active.quantity_on_hand = Set(on_hand);
                active.available_quantity = Set(available);
                active.last_updated = Set(now);
                active.update(conn).await?
            }
            None => {
                current_inventory::ActiveModel {
                    part_id: Set(update.part_id),
                    warehouse_id: Set(update.warehouse_id),
                    quantity_on_hand: Set(on_hand),
                    reserved_quantity: Set(0),
                    available_quantity: Set(available),
                    last_updated: Set(now),
                    ..Default::default()
                }
                .insert(conn)
                .await?
            }
        };

        let transaction = inventory_transaction::ActiveModel {
            part_id: Set(update.part_id),
            warehouse_id: Set(update.warehouse_id),
            transaction_type: Set(update.transaction_type),
            quantity: Set(update.quantity_change),
            reference_type: Set(update.reference_type),
            reference_id: Set(update.reference_id),
            unit_cost: Set(update.unit_cost.unwrap_or(Decimal::ZERO)),
            notes: Set(update.notes),
            created_by: Set(update
                .created_by
                .unwrap_or_else(|| DEFAULT_CREATED_BY.to_string())),
            transaction_date: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        let applied_change = on_hand - previous_on_hand;
        if applied_change != update.quantity_change {
            warn!(
                part_id = update.part_id,
                warehouse_id = update.warehouse_id,
                requested = update.quantity_change,
                applied = applied_change,
                "Stock floored at zero"
            );
        }

        info!(
            part_id = update.part_id,
            warehouse_id = update.warehouse_id,
            transaction_id = transaction.id,
            transaction_type = %transaction.transaction_type,
            quantity_change = update.quantity_change,
            quantity_on_hand = on_hand,
            "Stock updated"
        );

        Ok(StockMovement {
            transaction,
            balance,
            previous_on_hand,
            requested_change: update.quantity_change,
            applied_change,
            clamped: applied_change != update.quantity_change,
        })
    }

    pub(crate) async fn announce(&self, movement: &StockMovement) {
        self.event_sender
            .publish(Event::StockUpdated {
                part_id: movement.balance.part_id,
                warehouse_id: movement.balance.warehouse_id,
                transaction_id: movement.transaction.id,
                transaction_type: movement.transaction.transaction_type.to_string(),
                requested_change: movement.requested_change,
                applied_change: movement.applied_change,
                quantity_on_hand: movement.balance.quantity_on_hand,
            })
            .await;
    }

    /// One balance (warehouse given) or every balance of the part. Missing
    /// rows are `NotFound`, never a zero-valued level.
    #[instrument(skip(self))]
    pub async fn get_current_stock(
        &self,
        part_id: i32,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<StockLevel>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query =
            current_inventory::Entity::find().filter(current_inventory::Column::PartId.eq(part_id));
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(current_inventory::Column::WarehouseId.eq(warehouse_id));
        }
        let rows = query
            .order_by_asc(current_inventory::Column::WarehouseId)
            .all(db)
            .await?;

        if rows.is_empty() {
            return Err(ServiceError::NotFound(match warehouse_id {
                Some(warehouse_id) => format!(
                    "No stock record for part {} in warehouse {}",
                    part_id, warehouse_id
                ),
                None => format!("No stock records for part {}", part_id),
            }));
        }

        hydrate_levels(db, rows).await
    }

    /// Every balance, ordered by warehouse code then part code.
    #[instrument(skip(self))]
    pub async fn get_all_inventory(
        &self,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<StockLevel>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = current_inventory::Entity::find();
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(current_inventory::Column::WarehouseId.eq(warehouse_id));
        }
        let rows = query.all(db).await?;

        let mut levels = hydrate_levels(db, rows).await?;
        levels.sort_by(|a, b| {
            a.warehouse_code
                .cmp(&b.warehouse_code)
                .then_with(|| a.part_code.cmp(&b.part_code))
        });
        Ok(levels)
    }

    /// Replays the transaction log for one pair and compares it with the
    /// stored balance.
    #[instrument(skip(self))]
    pub async fn replay_balance(
        &self,
        part_id: i32,
        warehouse_id: i32,
    ) -> Result<LedgerAudit, ServiceError> {
        let db = self.db_pool.as_ref();

        let deltas: Vec<i32> = inventory_transaction::Entity::find()
            .select_only()
            .column(inventory_transaction::Column::Quantity)
            .filter(inventory_transaction::Column::PartId.eq(part_id))
            .filter(inventory_transaction::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(inventory_transaction::Column::Id)
            .into_tuple()
            .all(db)
            .await?;

        let stored_on_hand = find_balance(db, part_id, warehouse_id)
            .await?
            .map(|row| row.quantity_on_hand);
        let replayed_on_hand = replay(deltas.iter().copied());
        let consistent = match stored_on_hand {
            Some(stored) => stored == replayed_on_hand,
            None => deltas.is_empty(),
        };

        if !consistent {
            warn!(
                part_id,
                warehouse_id, replayed_on_hand, ?stored_on_hand, "Ledger replay mismatch"
            );
        }

        Ok(LedgerAudit {
            part_id,
            warehouse_id,
            transaction_count: deltas.len(),
            replayed_on_hand,
            stored_on_hand,
            consistent,
        })
    }
}

/// Balance row for the pair, locked for update where the backend supports it.
pub(crate) async fn find_balance<C>(
    conn: &C,
    part_id: i32,
    warehouse_id: i32,
) -> Result<Option<current_inventory::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    current_inventory::Entity::find()
        .filter(current_inventory::Column::PartId.eq(part_id))
        .filter(current_inventory::Column::WarehouseId.eq(warehouse_id))
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn ensure_part<C>(conn: &C, part_id: i32) -> Result<part::Model, ServiceError>
where
    C: ConnectionTrait,
{
    part::Entity::find_by_id(part_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))
}

pub(crate) async fn ensure_warehouse<C>(
    conn: &C,
    warehouse_id: i32,
) -> Result<warehouse::Model, ServiceError>
where
    C: ConnectionTrait,
{
    warehouse::Entity::find_by_id(warehouse_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", warehouse_id)))
}

/// Joins balance rows with their part and warehouse in two batched lookups.
pub(crate) async fn hydrate_levels<C>(
    conn: &C,
    rows: Vec<current_inventory::Model>,
) -> Result<Vec<StockLevel>, ServiceError>
where
    C: ConnectionTrait,
{
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let part_ids: Vec<i32> = rows.iter().map(|row| row.part_id).collect();
    let warehouse_ids: Vec<i32> = rows.iter().map(|row| row.warehouse_id).collect();

    let parts: HashMap<i32, part::Model> = part::Entity::find()
        .filter(part::Column::Id.is_in(part_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let warehouses: HashMap<i32, warehouse::Model> = warehouse::Entity::find()
        .filter(warehouse::Column::Id.is_in(warehouse_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|w| (w.id, w))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let part = parts.get(&row.part_id)?;
            let warehouse = warehouses.get(&row.warehouse_id)?;
            Some(StockLevel::new(row, part, warehouse))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_floors_every_step() {
        assert_eq!(replay(Vec::<i32>::new()), 0);
        assert_eq!(replay([50, -20]), 30);
        assert_eq!(replay([10, -30]), 0);
        // The floor is applied per step, not once at the end.
        assert_eq!(replay([10, -30, 5]), 5);
        assert_eq!(replay([-5, 0, 7]), 7);
    }

    #[test]
    fn stock_in_accepts_only_inbound_tags() {
        assert_eq!(
            Direction::Inbound.parse_tag("IN_PURCHASE").unwrap(),
            TransactionType::InPurchase
        );
        assert_eq!(
            Direction::Inbound.parse_tag(" in_return ").unwrap(),
            TransactionType::InReturn
        );
        assert!(matches!(
            Direction::Inbound.parse_tag("OUT_ISSUE"),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            Direction::Inbound.parse_tag("ADJUST"),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn stock_out_rejects_unknown_tags() {
        assert_eq!(
            Direction::Outbound.parse_tag("OUT_SCRAP").unwrap(),
            TransactionType::OutScrap
        );
        let err = Direction::Outbound.parse_tag("OUT_LOST").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: unknown transaction type 'OUT_LOST'"
        );
    }

    #[test]
    fn builder_sets_reference_and_notes() {
        let update = StockUpdate::new(1, 2, -2, TransactionType::Adjust)
            .reference("COUNT", Some(9))
            .notes("recount")
            .created_by("alice");
        assert_eq!(update.reference_type.as_deref(), Some("COUNT"));
        assert_eq!(update.reference_id, Some(9));
        assert_eq!(update.notes.as_deref(), Some("recount"));
        assert_eq!(update.created_by.as_deref(), Some("alice"));
        assert_eq!(update.unit_cost, None);
    }
}
