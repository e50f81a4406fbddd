use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::{
    clock::Clock,
    db::DbPool,
    entities::{
        current_inventory, inventory_transaction, part, part_location, stock_count_detail,
        warehouse, warehouse_location,
    },
    errors::{LocationConflict, ResultExt, ServiceError},
    events::{Event, EventSender},
    services::{clean_text, ImportReport, ServiceSettings},
};

pub const DEFAULT_UNIT: &str = "pcs";

/// A storage slot requested for a part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRef {
    pub warehouse_id: i32,
    pub location_code: String,
}

impl LocationRef {
    pub fn new(warehouse_id: i32, location_code: impl Into<String>) -> Self {
        Self {
            warehouse_id,
            location_code: location_code.into(),
        }
    }
}

/// Everything needed to create or fully replace a part.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PartInput {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    #[validate(range(min = 1))]
    pub quantity_per_box: i32,
    #[validate(range(min = 0))]
    pub safety_stock: i32,
    #[validate(range(min = 0))]
    pub reorder_point: i32,
    #[validate(custom = "validate_standard_cost")]
    pub standard_cost: Decimal,
    pub is_active: bool,
    pub locations: Vec<LocationRef>,
}

impl PartInput {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            unit: DEFAULT_UNIT.to_string(),
            quantity_per_box: 1,
            safety_stock: 0,
            reorder_point: 0,
            standard_cost: Decimal::ZERO,
            is_active: true,
            locations: Vec::new(),
        }
    }

    fn normalized(mut self) -> Self {
        self.code = self.code.trim().to_string();
        self.name = self.name.trim().to_string();
        self.unit = self.unit.trim().to_string();
        self.description = clean_text(self.description);
        self.locations = self
            .locations
            .into_iter()
            .map(|loc| LocationRef::new(loc.warehouse_id, normalize_location_code(&loc.location_code)))
            .collect();
        self
    }
}

fn validate_standard_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() {
        let mut err = ValidationError::new("standard_cost");
        err.message = Some("standard_cost must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Location codes compare case-insensitively; they are stored upper-cased.
pub fn normalize_location_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartLocationView {
    pub location_id: i32,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub warehouse_name: String,
    pub location_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartDetail {
    #[serde(flatten)]
    pub part: part::Model,
    pub locations: Vec<PartLocationView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum PartSortField {
    #[default]
    Code,
    Name,
    Description,
    Unit,
    QuantityPerBox,
    SafetyStock,
    ReorderPoint,
    StandardCost,
    CreatedAt,
}

impl PartSortField {
    /// Unknown field names fall back to sorting by code.
    pub fn parse_or_default(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }

    fn column(self) -> part::Column {
        match self {
            PartSortField::Code => part::Column::Code,
            PartSortField::Name => part::Column::Name,
            PartSortField::Description => part::Column::Description,
            PartSortField::Unit => part::Column::Unit,
            PartSortField::QuantityPerBox => part::Column::QuantityPerBox,
            PartSortField::SafetyStock => part::Column::SafetyStock,
            PartSortField::ReorderPoint => part::Column::ReorderPoint,
            PartSortField::StandardCost => part::Column::StandardCost,
            PartSortField::CreatedAt => part::Column::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartQuery {
    /// Case-insensitive substring of code or name.
    pub search: Option<String>,
    pub sort: PartSortField,
    pub direction: SortDirection,
    /// 1-based page number.
    pub page: u64,
    pub per_page: Option<u64>,
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartPage {
    pub items: Vec<part::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WarehouseInput {
    #[validate(length(min = 1, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

/// One spreadsheet row of a part import, still as raw text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartImportRow {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub quantity_per_box: Option<String>,
    /// `"WH1:A-01, WH2:B-03"` using warehouse codes.
    pub locations: Option<String>,
}

/// Splits `"WH:LOC, WH:LOC"` into trimmed `(warehouse_code, location_code)`
/// pairs. Empty segments are ignored.
pub fn parse_location_list(raw: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for segment in raw.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (warehouse, location) = segment
            .split_once(':')
            .map(|(w, l)| (w.trim(), l.trim()))
            .filter(|(w, l)| !w.is_empty() && !l.is_empty())
            .ok_or_else(|| {
                format!(
                    "invalid location '{}', expected WAREHOUSE:LOCATION",
                    segment
                )
            })?;
        pairs.push((warehouse.to_string(), location.to_string()));
    }
    Ok(pairs)
}

struct ResolvedLocation {
    warehouse: warehouse::Model,
    location_code: String,
    existing: Option<warehouse_location::Model>,
}

/// Master data: parts, warehouses and where parts may be stored.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    settings: Arc<ServiceSettings>,
}

impl CatalogService {
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

    /// Creates a part and its location claims in one transaction.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_part(&self, input: PartInput) -> Result<PartDetail, ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let txn = self.db_pool.begin().await?;

        if find_part_by_code(&txn, &input.code).await?.is_some() {
            return Err(ServiceError::DuplicateCode(format!(
                "Part code {} already exists",
                input.code
            )));
        }

        let resolved = resolve_locations(&txn, &input.locations).await?;
        let conflicts = find_conflicts(&txn, &resolved, None).await?;
        if !conflicts.is_empty() {
            warn!(code = %input.code, conflicts = conflicts.len(), "Location conflict on create");
            return Err(ServiceError::LocationConflict(conflicts));
        }

        let now = self.clock.now();
        let created = part::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            description: Set(input.description),
            unit: Set(input.unit),
            quantity_per_box: Set(input.quantity_per_box),
            safety_stock: Set(input.safety_stock),
            reorder_point: Set(input.reorder_point),
            standard_cost: Set(input.standard_cost),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let locations = attach_locations(&txn, created.id, resolved, now).await?;
        txn.commit().await.map_err_to_service()?;

        info!(part_id = created.id, code = %created.code, "Part created");
        self.event_sender
            .publish(Event::PartCreated {
                part_id: created.id,
                code: created.code.clone(),
            })
            .await;

        Ok(PartDetail {
            part: created,
            locations,
        })
    }

    /// Replaces every field and the whole location set of a part.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn update_part(&self, id: i32, input: PartInput) -> Result<PartDetail, ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let txn = self.db_pool.begin().await?;

        let existing = part::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;

        if let Some(other) = find_part_by_code(&txn, &input.code).await? {
            if other.id != id {
                return Err(ServiceError::DuplicateCode(format!(
                    "Part code {} already exists",
                    input.code
                )));
            }
        }

        let resolved = resolve_locations(&txn, &input.locations).await?;
        let conflicts = find_conflicts(&txn, &resolved, Some(id)).await?;
        if !conflicts.is_empty() {
            warn!(part_id = id, conflicts = conflicts.len(), "Location conflict on update");
            return Err(ServiceError::LocationConflict(conflicts));
        }

        let now = self.clock.now();
        let mut active: part::ActiveModel = existing.into();
        active.code = Set(input.code);
        active.name = Set(input.name);
        active.description = Set(input.description);
        active.unit = Set(input.unit);
        active.quantity_per_box = Set(input.quantity_per_box);
        active.safety_stock = Set(input.safety_stock);
        active.reorder_point = Set(input.reorder_point);
        active.standard_cost = Set(input.standard_cost);
        active.is_active = Set(input.is_active);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        part_location::Entity::delete_many()
            .filter(part_location::Column::PartId.eq(id))
            .exec(&txn)
            .await?;
        let locations = attach_locations(&txn, id, resolved, now).await?;

        txn.commit().await.map_err_to_service()?;

        info!(part_id = id, code = %updated.code, "Part updated");
        self.event_sender
            .publish(Event::PartUpdated {
                part_id: id,
                code: updated.code.clone(),
            })
            .await;

        Ok(PartDetail {
            part: updated,
            locations,
        })
    }

    /// Physically removes an unreferenced part and its location claims.
    /// Parts with balances, ledger rows or count lines must be archived.
    #[instrument(skip(self))]
    pub async fn delete_part(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        let existing = part::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;

        let balances = existing
            .find_related(current_inventory::Entity)
            .count(&txn)
            .await?;
        let transactions = existing
            .find_related(inventory_transaction::Entity)
            .count(&txn)
            .await?;
        let count_lines = existing
            .find_related(stock_count_detail::Entity)
            .count(&txn)
            .await?;

        if balances + transactions + count_lines > 0 {
            return Err(ServiceError::Referenced(format!(
                "Part {} is referenced by {} balance rows, {} transactions and {} count lines; archive it instead",
                existing.code, balances, transactions, count_lines
            )));
        }

        part_location::Entity::delete_many()
            .filter(part_location::Column::PartId.eq(id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await.map_err_to_service()?;

        info!(part_id = id, "Part deleted");
        self.event_sender.publish(Event::PartDeleted(id)).await;
        Ok(())
    }

    /// Soft delete: the part stays for history but is flagged inactive.
    #[instrument(skip(self))]
    pub async fn archive_part(&self, id: i32) -> Result<part::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let existing = part::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;

        let mut active: part::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(self.clock.now());
        let archived = active.update(db).await?;

        info!(part_id = id, "Part archived");
        self.event_sender.publish(Event::PartArchived(id)).await;
        Ok(archived)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<part::Model, ServiceError> {
        part_by_code(self.db_pool.as_ref(), code.trim()).await
    }

    /// A part with the locations it may be stored in.
    pub async fn get_by_id(&self, id: i32) -> Result<PartDetail, ServiceError> {
        let db = self.db_pool.as_ref();

        let part = part::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))?;
        let locations = load_part_locations(db, id).await?;

        Ok(PartDetail { part, locations })
    }

    #[instrument(skip(self))]
    pub async fn list_parts(&self, query: PartQuery) -> Result<PartPage, ServiceError> {
        let db = self.db_pool.as_ref();

        let page = if query.page == 0 { 1 } else { query.page };
        let per_page = query.per_page.unwrap_or(self.settings.parts_page_size);
        if per_page == 0 {
            return Err(ServiceError::ValidationError(
                "per_page must be greater than zero".to_string(),
            ));
        }

        let mut select = part::Entity::find();
        if !query.include_inactive {
            select = select.filter(part::Column::IsActive.eq(true));
        }
        if let Some(search) = clean_text(query.search) {
            let pattern = format!("%{}%", search.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(part::Column::Code))).like(pattern.clone()))
                    .add(Expr::expr(Func::lower(Expr::col(part::Column::Name))).like(pattern)),
            );
        }

        let column = query.sort.column();
        select = match query.direction {
            SortDirection::Asc => select.order_by_asc(column),
            SortDirection::Desc => select.order_by_desc(column),
        };
        select = select.order_by_asc(part::Column::Id);

        let paginator = select.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let total_pages = paginator.num_pages().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(PartPage {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Best-effort batch creation. Bad rows are reported, good rows commit.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn import_parts(&self, rows: Vec<PartImportRow>) -> Result<ImportReport, ServiceError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;

            let input = match self.import_row_input(row).await {
                Ok(input) => input,
                Err(message) => {
                    report.reject(row_number, message);
                    continue;
                }
            };

            match self.create_part(input).await {
                Ok(_) => report.imported += 1,
                Err(ServiceError::DatabaseError(e)) => return Err(ServiceError::DatabaseError(e)),
                Err(e) => report.reject(row_number, e.to_string()),
            }
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            "Part import finished"
        );
        Ok(report)
    }

    async fn import_row_input(&self, row: PartImportRow) -> Result<PartInput, String> {
        let code = row.code.trim();
        let name = row.name.trim();
        if code.is_empty() || name.is_empty() {
            return Err("part code and name are required".to_string());
        }

        let mut input = PartInput::new(code, name);
        input.description = row.description;
        if let Some(unit) = clean_text(row.unit) {
            input.unit = unit;
        }
        if let Some(raw) = clean_text(row.quantity_per_box) {
            input.quantity_per_box = raw
                .parse::<i32>()
                .map_err(|_| format!("quantity per box '{}' is not a number", raw))?;
        }

        let pairs = match row.locations {
            Some(raw) => parse_location_list(&raw)?,
            None => Vec::new(),
        };
        let mut warehouses: HashMap<String, i32> = HashMap::new();
        for (warehouse_code, location_code) in pairs {
            let warehouse_id = match warehouses.get(&warehouse_code) {
                Some(id) => *id,
                None => {
                    let found = self
                        .get_warehouse_by_code(&warehouse_code)
                        .await
                        .map_err(|e| e.to_string())?;
                    warehouses.insert(warehouse_code.clone(), found.id);
                    found.id
                }
            };
            input
                .locations
                .push(LocationRef::new(warehouse_id, location_code));
        }

        Ok(input)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_warehouse(
        &self,
        input: WarehouseInput,
    ) -> Result<warehouse::Model, ServiceError> {
        let code = input.code.trim().to_string();
        let name = input.name.trim().to_string();
        let input = WarehouseInput {
            code,
            name,
            description: clean_text(input.description),
        };
        input.validate()?;

        let db = self.db_pool.as_ref();
        let exists = warehouse::Entity::find()
            .filter(warehouse::Column::Code.eq(input.code.as_str()))
            .one(db)
            .await?;
        if exists.is_some() {
            return Err(ServiceError::DuplicateCode(format!(
                "Warehouse code {} already exists",
                input.code
            )));
        }

        let created = warehouse::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            description: Set(input.description),
            is_active: Set(true),
            created_at: Set(self.clock.now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(warehouse_id = created.id, code = %created.code, "Warehouse created");
        Ok(created)
    }

    /// Active warehouses ordered by name.
    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        warehouse::Entity::find()
            .filter(warehouse::Column::IsActive.eq(true))
            .order_by_asc(warehouse::Column::Name)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_warehouse_by_code(&self, code: &str) -> Result<warehouse::Model, ServiceError> {
        let code = code.trim();
        warehouse::Entity::find()
            .filter(warehouse::Column::Code.eq(code))
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", code)))
    }

    pub async fn create_location(
        &self,
        warehouse_id: i32,
        location_code: &str,
        description: Option<String>,
    ) -> Result<warehouse_location::Model, ServiceError> {
        let location_code = normalize_location_code(location_code);
        if location_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "location code is required".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let warehouse = warehouse::Entity::find_by_id(warehouse_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", warehouse_id)))?;

        let exists = warehouse_location::Entity::find()
            .filter(warehouse_location::Column::WarehouseId.eq(warehouse_id))
            .filter(warehouse_location::Column::LocationCode.eq(location_code.as_str()))
            .one(db)
            .await?;
        if exists.is_some() {
            return Err(ServiceError::DuplicateCode(format!(
                "Location {} already exists in warehouse {}",
                location_code, warehouse.code
            )));
        }

        warehouse_location::ActiveModel {
            warehouse_id: Set(warehouse_id),
            location_code: Set(location_code),
            description: Set(clean_text(description)),
            created_at: Set(self.clock.now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)
    }

    pub async fn list_locations(
        &self,
        warehouse_id: i32,
    ) -> Result<Vec<warehouse_location::Model>, ServiceError> {
        warehouse_location::Entity::find()
            .filter(warehouse_location::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(warehouse_location::Column::LocationCode)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

async fn find_part_by_code<C>(conn: &C, code: &str) -> Result<Option<part::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    part::Entity::find()
        .filter(part::Column::Code.eq(code))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Looks a part up by its exact code.
pub(crate) async fn part_by_code<C>(conn: &C, code: &str) -> Result<part::Model, ServiceError>
where
    C: ConnectionTrait,
{
    find_part_by_code(conn, code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", code)))
}

async fn resolve_locations<C>(
    conn: &C,
    requested: &[LocationRef],
) -> Result<Vec<ResolvedLocation>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut seen = HashSet::new();
    let mut warehouses: HashMap<i32, warehouse::Model> = HashMap::new();
    let mut resolved = Vec::with_capacity(requested.len());

    for location in requested {
        if location.location_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "location code is required".to_string(),
            ));
        }
        if !seen.insert((location.warehouse_id, location.location_code.clone())) {
            return Err(ServiceError::ValidationError(format!(
                "location {} is requested twice for warehouse {}",
                location.location_code, location.warehouse_id
            )));
        }

        let warehouse = match warehouses.get(&location.warehouse_id) {
            Some(warehouse) => warehouse.clone(),
            None => {
                let warehouse = warehouse::Entity::find_by_id(location.warehouse_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Warehouse {} not found",
                            location.warehouse_id
                        ))
                    })?;
                warehouses.insert(warehouse.id, warehouse.clone());
                warehouse
            }
        };

        let existing = warehouse_location::Entity::find()
            .filter(warehouse_location::Column::WarehouseId.eq(location.warehouse_id))
            .filter(warehouse_location::Column::LocationCode.eq(location.location_code.as_str()))
            .one(conn)
            .await?;

        resolved.push(ResolvedLocation {
            warehouse,
            location_code: location.location_code.clone(),
            existing,
        });
    }

    Ok(resolved)
}

/// Other parts already holding any of the requested locations.
async fn find_conflicts<C>(
    conn: &C,
    resolved: &[ResolvedLocation],
    exclude_part: Option<i32>,
) -> Result<Vec<LocationConflict>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut conflicts = Vec::new();

    for location in resolved {
        let Some(existing) = &location.existing else {
            continue;
        };

        let mut claims = part_location::Entity::find()
            .filter(part_location::Column::LocationId.eq(existing.id));
        if let Some(part_id) = exclude_part {
            claims = claims.filter(part_location::Column::PartId.ne(part_id));
        }
        let part_ids: Vec<i32> = claims
            .all(conn)
            .await?
            .into_iter()
            .map(|claim| claim.part_id)
            .collect();
        if part_ids.is_empty() {
            continue;
        }

        let parts = part::Entity::find()
            .filter(part::Column::Id.is_in(part_ids))
            .order_by_asc(part::Column::Code)
            .all(conn)
            .await?;

        conflicts.push(LocationConflict {
            warehouse_code: location.warehouse.code.clone(),
            warehouse_name: location.warehouse.name.clone(),
            location_code: location.location_code.clone(),
            parts: parts.iter().map(part::Model::label).collect(),
        });
    }

    Ok(conflicts)
}

/// Links the part to each location, creating missing location rows.
async fn attach_locations<C>(
    conn: &C,
    part_id: i32,
    resolved: Vec<ResolvedLocation>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<PartLocationView>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut views = Vec::with_capacity(resolved.len());

    for location in resolved {
        let row = match location.existing {
            Some(row) => row,
            None => {
                warehouse_location::ActiveModel {
                    warehouse_id: Set(location.warehouse.id),
                    location_code: Set(location.location_code.clone()),
                    description: Set(None),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(conn)
                .await?
            }
        };

        part_location::ActiveModel {
            part_id: Set(part_id),
            location_id: Set(row.id),
        }
        .insert(conn)
        .await?;

        views.push(PartLocationView {
            location_id: row.id,
            warehouse_id: location.warehouse.id,
            warehouse_code: location.warehouse.code,
            warehouse_name: location.warehouse.name,
            location_code: row.location_code,
        });
    }

    Ok(views)
}

async fn load_part_locations<C>(conn: &C, part_id: i32) -> Result<Vec<PartLocationView>, ServiceError>
where
    C: ConnectionTrait,
{
    let location_ids: Vec<i32> = part_location::Entity::find()
        .filter(part_location::Column::PartId.eq(part_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|claim| claim.location_id)
        .collect();
    if location_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = warehouse_location::Entity::find()
        .filter(warehouse_location::Column::Id.is_in(location_ids))
        .find_also_related(warehouse::Entity)
        .all(conn)
        .await?;

    // Ordered by warehouse code, then location code.
    let mut ordered: BTreeMap<(String, String), PartLocationView> = BTreeMap::new();
    for (location, warehouse) in rows {
        let Some(warehouse) = warehouse else {
            continue;
        };
        ordered.insert(
            (warehouse.code.clone(), location.location_code.clone()),
            PartLocationView {
                location_id: location.id,
                warehouse_id: warehouse.id,
                warehouse_code: warehouse.code,
                warehouse_name: warehouse.name,
                location_code: location.location_code,
            },
        );
    }

    Ok(ordered.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_list_parses_pairs() {
        let pairs = parse_location_list(" WH1:A-01 , WH2:B-03,, ").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("WH1".to_string(), "A-01".to_string()),
                ("WH2".to_string(), "B-03".to_string())
            ]
        );
        assert!(parse_location_list("").unwrap().is_empty());
    }

    #[test]
    fn location_list_rejects_malformed_segments() {
        assert!(parse_location_list("WH1-A01").is_err());
        assert!(parse_location_list("WH1:").is_err());
        assert!(parse_location_list(":A-01").is_err());
    }

    #[test]
    fn unknown_sort_falls_back_to_code() {
        assert_eq!(PartSortField::parse_or_default("name"), PartSortField::Name);
        assert_eq!(
            PartSortField::parse_or_default("reorder_point"),
            PartSortField::ReorderPoint
        );
        assert_eq!(PartSortField::parse_or_default("colour"), PartSortField::Code);
    }

    #[test]
    fn part_input_validation() {
        let mut input = PartInput::new("P-1", "Bolt");
        assert!(input.validate().is_ok());

        input.quantity_per_box = 0;
        input.standard_cost = Decimal::new(-100, 2);
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("quantity_per_box"));
        assert!(errors.field_errors().contains_key("standard_cost"));
    }

    #[test]
    fn normalization_trims_and_uppercases_locations() {
        let mut input = PartInput::new("  P-1 ", " Bolt ");
        input.description = Some("   ".into());
        input.locations = vec![LocationRef::new(1, " a-01 ")];
        let input = input.normalized();
        assert_eq!(input.code, "P-1");
        assert_eq!(input.name, "Bolt");
        assert_eq!(input.description, None);
        assert_eq!(input.locations, vec![LocationRef::new(1, "A-01")]);
    }
}
