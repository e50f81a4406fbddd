use std::{process::ExitCode, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use stockroom::{
    clock,
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::stock_count::StockCountType,
    events::{self, Event, EventSender},
    services::{
        catalog::{
            parse_location_list, LocationRef, PartInput, PartQuery, PartSortField, SortDirection,
            WarehouseInput,
        },
        ledger::{MovementRequest, StockLevel, StockMovement},
        reports::TransactionQuery,
        stock_counts::{NewStockCount, StockCountSheet},
        AppServices, ServiceSettings,
    },
    ServiceError,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load application config: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err, config.is_development()),
    }
}

async fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    let context = CliContext::initialize(config).await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Warehouse(command) => handle_warehouse_command(&context, command, cli.json).await?,
        Commands::Part(command) => handle_part_command(&context, command, cli.json).await?,
        Commands::Stock(command) => handle_stock_command(&context, command, cli.json).await?,
        Commands::Count(command) => handle_count_command(&context, command, cli.json).await?,
    }

    Ok(())
}

/// Service errors exit with 2, or 3 when another record has to be dealt with
/// first. Database details only reach the terminal in development.
fn report_failure(err: &anyhow::Error, verbose: bool) -> ExitCode {
    match err.downcast_ref::<ServiceError>() {
        Some(service_error) => {
            eprintln!(
                "error [{}]: {}",
                service_error.error_code(),
                service_error.response_message()
            );
            if service_error.is_conflict() {
                eprintln!("hint: resolve the conflicting record, then retry");
            }
        }
        None => eprintln!("error: {err}"),
    }
    if verbose {
        eprintln!("{err:?}");
    }
    ExitCode::from(exit_status(err))
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ServiceError>() {
        Some(service_error) if service_error.is_conflict() => 3,
        Some(_) => 2,
        None => 1,
    }
}

#[derive(Parser)]
#[command(name = "stockroom", about = "Parts, stock levels and stock counts", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    #[command(subcommand)]
    Warehouse(WarehouseCommands),
    #[command(subcommand)]
    Part(PartCommands),
    #[command(subcommand)]
    Stock(StockCommands),
    #[command(subcommand)]
    Count(CountCommands),
}

#[derive(Subcommand)]
enum WarehouseCommands {
    Add(AddWarehouseArgs),
    List,
}

#[derive(Args)]
struct AddWarehouseArgs {
    #[arg(long, help = "Short unique warehouse code")]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand)]
enum PartCommands {
    Add(AddPartArgs),
    Show(PartCodeArgs),
    List(ListPartsArgs),
    Archive(PartCodeArgs),
    Delete(PartCodeArgs),
}

#[derive(Args)]
struct AddPartArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, default_value = "pcs")]
    unit: String,
    #[arg(long, default_value_t = 1)]
    qty_per_box: i32,
    #[arg(long, default_value_t = 0)]
    safety_stock: i32,
    #[arg(long, default_value_t = 0)]
    reorder_point: i32,
    #[arg(long, help = "Standard unit cost, e.g. 12.50")]
    cost: Option<Decimal>,
    #[arg(
        long = "location",
        help = "Storage location as WAREHOUSE:LOCATION; repeatable"
    )]
    locations: Vec<String>,
}

#[derive(Args)]
struct PartCodeArgs {
    code: String,
}

#[derive(Args)]
struct ListPartsArgs {
    #[arg(long, help = "Case-insensitive match on code or name")]
    search: Option<String>,
    #[arg(long, default_value = "code")]
    sort: String,
    #[arg(long, action = ArgAction::SetTrue)]
    desc: bool,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long)]
    per_page: Option<u64>,
    #[arg(long, action = ArgAction::SetTrue, help = "Include archived parts")]
    all: bool,
}

#[derive(Subcommand)]
enum StockCommands {
    In(MovementArgs),
    Out(MovementArgs),
    Show(StockShowArgs),
    Low(WarehouseFilterArgs),
    Transactions(TransactionsArgs),
    Summary(SummaryArgs),
}

#[derive(Args)]
struct MovementArgs {
    #[arg(long)]
    part: String,
    #[arg(long, help = "Warehouse code")]
    warehouse: String,
    #[arg(long)]
    qty: i32,
    #[arg(long = "type", help = "IN_PURCHASE, IN_TRANSFER, IN_RETURN, OUT_ISSUE, OUT_TRANSFER or OUT_SCRAP")]
    transaction_type: String,
    #[arg(long)]
    reference_type: Option<String>,
    #[arg(long)]
    reference_id: Option<i32>,
    #[arg(long)]
    cost: Option<Decimal>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    by: Option<String>,
}

#[derive(Args)]
struct StockShowArgs {
    #[arg(long)]
    part: String,
    #[arg(long)]
    warehouse: Option<String>,
}

#[derive(Args)]
struct WarehouseFilterArgs {
    #[arg(long)]
    warehouse: Option<String>,
}

#[derive(Args)]
struct TransactionsArgs {
    #[arg(long)]
    part: Option<String>,
    #[arg(long)]
    warehouse: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(long)]
    part: String,
    #[arg(long)]
    warehouse: Option<String>,
    #[arg(long)]
    days: Option<u32>,
}

#[derive(Subcommand)]
enum CountCommands {
    Create(CreateCountArgs),
    Start(CountIdArgs),
    Record(RecordCountArgs),
    Complete(CompleteCountArgs),
    Cancel(CountIdArgs),
    Show(CountIdArgs),
    List(WarehouseFilterArgs),
}

#[derive(Args)]
struct CreateCountArgs {
    #[arg(long)]
    warehouse: String,
    #[arg(long = "type", default_value = "full", help = "full, cycle or spot")]
    count_type: StockCountType,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    counted_by: Option<String>,
}

#[derive(Args)]
struct CountIdArgs {
    id: i32,
}

#[derive(Args)]
struct RecordCountArgs {
    id: i32,
    #[arg(long)]
    part: String,
    #[arg(long)]
    qty: i32,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct CompleteCountArgs {
    id: i32,
    #[arg(long)]
    verified_by: Option<String>,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Post non-zero variances to the ledger as ADJUST movements"
    )]
    apply: bool,
}

struct CliContext {
    db: Arc<DbPool>,
    services: AppServices,
}

impl CliContext {
    async fn initialize(config: &AppConfig) -> Result<Self> {
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(config)
            .await
            .context("failed to connect to database")?;
        db::check_connection(&db_pool)
            .await
            .context("database did not answer")?;
        let db = Arc::new(db_pool);

        if config.auto_migrate {
            db::run_migrations(&db)
                .await
                .context("failed to run migrations")?;
        }

        let (event_tx, event_rx) = mpsc::channel::<Event>(config.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));
        tokio::spawn(events::process_events(event_rx));

        let services = build_services(config, db.clone(), event_sender);
        info!(environment = %config.environment, "stockroom cli ready");

        Ok(Self { db, services })
    }

    async fn warehouse_id(&self, code: &str) -> Result<i32> {
        Ok(self.services.catalog.get_warehouse_by_code(code).await?.id)
    }

    async fn optional_warehouse_id(&self, code: Option<&str>) -> Result<Option<i32>> {
        match code {
            Some(code) => Ok(Some(self.warehouse_id(code).await?)),
            None => Ok(None),
        }
    }

    async fn part_id(&self, code: &str) -> Result<i32> {
        Ok(self.services.catalog.get_by_code(code).await?.id)
    }
}

fn build_services(
    config: &AppConfig,
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
) -> AppServices {
    AppServices::new(
        db,
        event_sender,
        clock::system_clock(),
        ServiceSettings::from(config),
    )
}

async fn handle_warehouse_command(
    context: &CliContext,
    command: WarehouseCommands,
    json: bool,
) -> Result<()> {
    let catalog = &context.services.catalog;

    match command {
        WarehouseCommands::Add(args) => {
            let warehouse = catalog
                .create_warehouse(WarehouseInput {
                    code: args.code,
                    name: args.name,
                    description: args.description,
                })
                .await
                .context("failed to create warehouse")?;
            if json {
                print_json(&warehouse)?;
            } else {
                println!("Warehouse {} created (id {})", warehouse.code, warehouse.id);
            }
        }
        WarehouseCommands::List => {
            let warehouses = catalog.list_warehouses().await?;
            if json {
                print_json(&warehouses)?;
            } else if warehouses.is_empty() {
                println!("No warehouses");
            } else {
                for warehouse in warehouses {
                    println!("- {} • {} (id {})", warehouse.code, warehouse.name, warehouse.id);
                }
            }
        }
    }

    Ok(())
}

async fn handle_part_command(context: &CliContext, command: PartCommands, json: bool) -> Result<()> {
    let catalog = &context.services.catalog;

    match command {
        PartCommands::Add(args) => {
            let mut input = PartInput::new(args.code, args.name);
            input.description = args.description;
            input.unit = args.unit;
            input.quantity_per_box = args.qty_per_box;
            input.safety_stock = args.safety_stock;
            input.reorder_point = args.reorder_point;
            input.standard_cost = args.cost.unwrap_or(Decimal::ZERO);

            let pairs = parse_location_list(&args.locations.join(",")).map_err(|e| anyhow!(e))?;
            for (warehouse_code, location_code) in pairs {
                let warehouse_id = context.warehouse_id(&warehouse_code).await?;
                input
                    .locations
                    .push(LocationRef::new(warehouse_id, location_code));
            }

            let detail = catalog.create_part(input).await.context("failed to create part")?;
            if json {
                print_json(&detail)?;
            } else {
                println!("Part {} created (id {})", detail.part.label(), detail.part.id);
                for location in &detail.locations {
                    println!("  at {} {}", location.warehouse_code, location.location_code);
                }
            }
        }
        PartCommands::Show(args) => {
            let part_id = context.part_id(&args.code).await?;
            let detail = catalog.get_by_id(part_id).await?;
            if json {
                print_json(&detail)?;
            } else {
                let part = &detail.part;
                println!("{}", part.label());
                if let Some(description) = &part.description {
                    println!("  {}", description);
                }
                println!(
                    "  unit {} • {} per box • safety {} • reorder at {} • cost {}",
                    part.unit,
                    part.quantity_per_box,
                    part.safety_stock,
                    part.reorder_point,
                    part.standard_cost
                );
                if !part.is_active {
                    println!("  archived");
                }
                for location in &detail.locations {
                    println!("  at {} {}", location.warehouse_code, location.location_code);
                }
            }
        }
        PartCommands::List(args) => {
            let page = catalog
                .list_parts(PartQuery {
                    search: args.search,
                    sort: PartSortField::parse_or_default(&args.sort),
                    direction: if args.desc {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    },
                    page: args.page,
                    per_page: args.per_page,
                    include_inactive: args.all,
                })
                .await?;
            if json {
                print_json(&page)?;
            } else {
                for part in &page.items {
                    println!("- {} • {}", part.label(), part.unit);
                }
                println!(
                    "page {}/{} • {} parts",
                    page.page, page.total_pages, page.total
                );
            }
        }
        PartCommands::Archive(args) => {
            let part_id = context.part_id(&args.code).await?;
            let part = catalog.archive_part(part_id).await?;
            if json {
                print_json(&part)?;
            } else {
                println!("Part {} archived", part.code);
            }
        }
        PartCommands::Delete(args) => {
            let part_id = context.part_id(&args.code).await?;
            catalog.delete_part(part_id).await?;
            println!("Part {} deleted", args.code);
        }
    }

    Ok(())
}

async fn handle_stock_command(context: &CliContext, command: StockCommands, json: bool) -> Result<()> {
    let services = &context.services;

    match command {
        StockCommands::In(args) => {
            let request = movement_request(context, args).await?;
            let movement = services.ledger.stock_in(request).await?;
            render_movement(&movement, json)?;
        }
        StockCommands::Out(args) => {
            let request = movement_request(context, args).await?;
            let movement = services.ledger.stock_out(request).await?;
            render_movement(&movement, json)?;
        }
        StockCommands::Show(args) => {
            let part_id = context.part_id(&args.part).await?;
            let warehouse_id = context.optional_warehouse_id(args.warehouse.as_deref()).await?;
            let levels = services.ledger.get_current_stock(part_id, warehouse_id).await?;
            if json {
                print_json(&levels)?;
            } else {
                levels.iter().for_each(render_level);
            }
        }
        StockCommands::Low(args) => {
            let warehouse_id = context.optional_warehouse_id(args.warehouse.as_deref()).await?;
            let items = services.reports.get_low_stock_items(warehouse_id).await?;
            if json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("Nothing at or below its reorder point");
            } else {
                for item in items {
                    println!(
                        "- {} @ {} • available {} • reorder at {} • short {} • order {}",
                        item.stock.part_code,
                        item.stock.warehouse_code,
                        item.stock.available_quantity,
                        item.stock.reorder_point,
                        item.shortage,
                        item.suggested_order
                    );
                }
            }
        }
        StockCommands::Transactions(args) => {
            let part_id = match args.part.as_deref() {
                Some(code) => Some(context.part_id(code).await?),
                None => None,
            };
            let warehouse_id = context.optional_warehouse_id(args.warehouse.as_deref()).await?;
            let rows = services
                .reports
                .get_transactions(TransactionQuery {
                    part_id,
                    warehouse_id,
                    limit: args.limit,
                })
                .await?;
            if json {
                print_json(&rows)?;
            } else {
                for row in rows {
                    println!(
                        "- #{} {} • {} @ {} • {:+} • {}",
                        row.transaction.id,
                        row.transaction.transaction_date.format("%Y-%m-%d %H:%M"),
                        row.part_code,
                        row.warehouse_code,
                        row.transaction.quantity,
                        row.transaction.transaction_type
                    );
                }
            }
        }
        StockCommands::Summary(args) => {
            let part_id = context.part_id(&args.part).await?;
            let warehouse_id = context.optional_warehouse_id(args.warehouse.as_deref()).await?;
            let summary = services
                .reports
                .get_transaction_summary(part_id, warehouse_id, args.days)
                .await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "{} over {} days: in {} • out {} • {} transactions",
                    args.part,
                    summary.window_days,
                    summary.total_in,
                    summary.total_out,
                    summary.transaction_count
                );
            }
        }
    }

    Ok(())
}

async fn movement_request(context: &CliContext, args: MovementArgs) -> Result<MovementRequest> {
    Ok(MovementRequest {
        warehouse_id: context.warehouse_id(&args.warehouse).await?,
        part_code: args.part,
        quantity: args.qty,
        transaction_type: args.transaction_type,
        reference_type: args.reference_type,
        reference_id: args.reference_id,
        unit_cost: args.cost,
        notes: args.notes,
        created_by: args.by,
    })
}

async fn handle_count_command(context: &CliContext, command: CountCommands, json: bool) -> Result<()> {
    let counts = &context.services.stock_counts;

    match command {
        CountCommands::Create(args) => {
            let warehouse_id = context.warehouse_id(&args.warehouse).await?;
            let count = counts
                .create_count(NewStockCount {
                    warehouse_id,
                    count_type: args.count_type,
                    description: args.description,
                    counted_by: args.counted_by,
                })
                .await
                .context("failed to create stock count")?;
            if json {
                print_json(&count)?;
            } else {
                println!(
                    "Stock count {} created (id {}) with {} lines",
                    count.count_number, count.id, count.total_items
                );
            }
        }
        CountCommands::Start(args) => {
            if counts.start_count(args.id).await? {
                println!("Stock count {} started", args.id);
            } else {
                println!("Stock count {} is not in planning; nothing changed", args.id);
            }
        }
        CountCommands::Record(args) => {
            let part_id = context.part_id(&args.part).await?;
            let detail = counts
                .record_count(args.id, part_id, args.qty, args.notes)
                .await?;
            if json {
                print_json(&detail)?;
            } else {
                println!(
                    "{} counted {} (system {}, variance {:+})",
                    args.part, args.qty, detail.system_quantity, detail.variance_quantity
                );
            }
        }
        CountCommands::Complete(args) => {
            let report = counts
                .complete_count(args.id, args.verified_by, args.apply)
                .await?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "Stock count {} completed • {} lines • {} with variance • {} adjustments posted",
                    report.count.count_number,
                    report.count.total_items,
                    report.count.variance_items,
                    report.adjustments.len()
                );
            }
        }
        CountCommands::Cancel(args) => {
            let count = counts.cancel_count(args.id).await?;
            if json {
                print_json(&count)?;
            } else {
                println!("Stock count {} cancelled", count.count_number);
            }
        }
        CountCommands::Show(args) => {
            let sheet = counts.get_count_details(args.id).await?;
            if json {
                print_json(&sheet)?;
            } else {
                render_sheet(&sheet);
            }
        }
        CountCommands::List(args) => {
            let warehouse_id = context.optional_warehouse_id(args.warehouse.as_deref()).await?;
            let list = counts.list_counts(warehouse_id).await?;
            if json {
                print_json(&list)?;
            } else {
                for count in list {
                    println!(
                        "- {} (id {}) • {} • {} • {} lines",
                        count.count_number, count.id, count.count_type, count.status, count.total_items
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_movement(movement: &StockMovement, json: bool) -> Result<()> {
    if json {
        return print_json(movement);
    }
    println!(
        "Transaction #{} {} {:+} • on hand {} -> {}",
        movement.transaction.id,
        movement.transaction.transaction_type,
        movement.requested_change,
        movement.previous_on_hand,
        movement.balance.quantity_on_hand
    );
    if movement.clamped {
        println!(
            "  warning: only {} could be applied, stock floored at zero",
            movement.applied_change
        );
    }
    Ok(())
}

fn render_level(level: &StockLevel) {
    println!(
        "- {} @ {} • on hand {} • available {} {}",
        level.part_code,
        level.warehouse_code,
        level.quantity_on_hand,
        level.available_quantity,
        level.unit
    );
}

fn render_sheet(sheet: &StockCountSheet) {
    let count = &sheet.count;
    println!(
        "Stock count {} • {} • {}",
        count.count_number, count.count_type, count.status
    );
    for line in &sheet.details {
        let counted = line
            .detail
            .counted_quantity
            .map(|q| q.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {} • system {} • counted {} • variance {:+}",
            line.part_code, line.detail.system_quantity, counted, line.detail.variance_quantity
        );
    }
}
