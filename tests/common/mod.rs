#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use stockroom::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{inventory_transaction::TransactionType, part, warehouse},
    events::{Event, EventSender},
    services::{
        catalog::{PartInput, WarehouseInput},
        ledger::{StockMovement, StockUpdate},
        AppServices, ServiceSettings,
    },
    FixedClock,
};
use tokio::sync::mpsc;

/// Services over a fresh in-memory SQLite database with a pinned clock.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub clock: FixedClock,
    events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(ServiceSettings::default()).await
    }

    pub async fn with_settings(settings: ServiceSettings) -> Self {
        // One connection keeps the in-memory database alive and shared.
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap());
        let services = AppServices::new(
            db.clone(),
            event_sender,
            Arc::new(clock.clone()),
            settings,
        );

        Self {
            db,
            services,
            clock,
            events: event_rx,
        }
    }

    /// Everything published so far, oldest first.
    pub fn take_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn warehouse(&self, code: &str, name: &str) -> warehouse::Model {
        self.services
            .catalog
            .create_warehouse(WarehouseInput {
                code: code.to_string(),
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("create warehouse")
    }

    pub async fn part(&self, code: &str, name: &str) -> part::Model {
        self.part_with(code, name, 0, 0).await
    }

    pub async fn part_with(
        &self,
        code: &str,
        name: &str,
        reorder_point: i32,
        safety_stock: i32,
    ) -> part::Model {
        let mut input = PartInput::new(code, name);
        input.reorder_point = reorder_point;
        input.safety_stock = safety_stock;
        self.services
            .catalog
            .create_part(input)
            .await
            .expect("create part")
            .part
    }

    pub async fn update(
        &self,
        part_id: i32,
        warehouse_id: i32,
        delta: i32,
        transaction_type: TransactionType,
    ) -> StockMovement {
        self.services
            .ledger
            .update_stock(StockUpdate::new(part_id, warehouse_id, delta, transaction_type))
            .await
            .expect("update stock")
    }

    pub async fn receive(&self, part_id: i32, warehouse_id: i32, quantity: i32) -> StockMovement {
        self.update(part_id, warehouse_id, quantity, TransactionType::InPurchase)
            .await
    }

    pub async fn on_hand(&self, part_id: i32, warehouse_id: i32) -> i32 {
        self.services
            .ledger
            .get_current_stock(part_id, Some(warehouse_id))
            .await
            .expect("balance row")[0]
            .quantity_on_hand
    }
}
