use std::sync::Arc;

use serde::Serialize;

use crate::{
    clock::Clock,
    config::{AppConfig, NegativeStockPolicy},
    db::DbPool,
    events::EventSender,
};

// Master data
pub mod catalog;

// Stock ledger and reconciliation
pub mod ledger;
pub mod stock_counts;

// Read-only views
pub mod reports;

use catalog::CatalogService;
use ledger::StockLedgerService;
use reports::ReportService;
use stock_counts::StockCountService;

/// Business tunables shared by every service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub negative_stock_policy: NegativeStockPolicy,
    pub transaction_summary_days: u32,
    pub transaction_list_limit: u64,
    pub parts_page_size: u64,
    pub count_number_prefix: String,
    pub utc_offset_hours: i32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            negative_stock_policy: NegativeStockPolicy::Clamp,
            transaction_summary_days: 30,
            transaction_list_limit: 100,
            parts_page_size: 50,
            count_number_prefix: "SC".to_string(),
            utc_offset_hours: 0,
        }
    }
}

impl From<&AppConfig> for ServiceSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            negative_stock_policy: cfg.negative_stock_policy,
            transaction_summary_days: cfg.transaction_summary_days,
            transaction_list_limit: cfg.transaction_list_limit,
            parts_page_size: cfg.parts_page_size,
            count_number_prefix: cfg.count_number_prefix.clone(),
            utc_offset_hours: cfg.utc_offset_hours,
        }
    }
}

/// A rejected row from a best-effort batch import. `row` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Outcome of a best-effort batch: good rows are committed, bad rows reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub(crate) fn reject(&mut self, row: usize, message: impl Into<String>) {
        self.skipped += 1;
        self.errors.push(RowError {
            row,
            message: message.into(),
        });
    }
}

/// Trims a free-text field and drops it when nothing is left.
pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub ledger: StockLedgerService,
    pub stock_counts: StockCountService,
    pub reports: ReportService,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let ledger = StockLedgerService::new(
            db_pool.clone(),
            event_sender.clone(),
            clock.clone(),
            settings.clone(),
        );

        Self {
            catalog: CatalogService::new(
                db_pool.clone(),
                event_sender.clone(),
                clock.clone(),
                settings.clone(),
            ),
            stock_counts: StockCountService::new(
                db_pool.clone(),
                event_sender,
                clock.clone(),
                settings.clone(),
                ledger.clone(),
            ),
            reports: ReportService::new(db_pool, clock, settings),
            ledger,
        }
    }
}
