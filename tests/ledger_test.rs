mod common;

use chrono::Duration;
use common::TestApp;
use rust_decimal_macros::dec;
use stockroom::{
    config::NegativeStockPolicy,
    entities::inventory_transaction::TransactionType,
    events::Event,
    services::{
        ledger::{MovementRequest, StockUpdate},
        reports::TransactionQuery,
        ServiceSettings,
    },
    Clock, ServiceError,
};

fn request(part_code: &str, warehouse_id: i32, quantity: i32, tag: &str) -> MovementRequest {
    MovementRequest {
        part_code: part_code.to_string(),
        warehouse_id,
        quantity,
        transaction_type: tag.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn inbound_then_outbound_keeps_ledger_and_balance_in_step() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    let first = app.update(p1.id, wh.id, 50, TransactionType::InPurchase).await;
    assert_eq!(first.previous_on_hand, 0);
    assert_eq!(first.balance.quantity_on_hand, 50);
    assert_eq!(first.balance.available_quantity, 50);

    let second = app.update(p1.id, wh.id, -20, TransactionType::OutIssue).await;
    assert_eq!(second.balance.quantity_on_hand, 30);
    assert!(!second.clamped);
    assert_eq!(app.on_hand(p1.id, wh.id).await, 30);

    let rows = app
        .services
        .reports
        .get_transactions(TransactionQuery {
            part_id: Some(p1.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let deltas: Vec<i32> = rows.iter().map(|r| r.transaction.quantity).collect();
    // Newest first.
    assert_eq!(deltas, vec![-20, 50]);
    assert_eq!(rows[0].transaction.transaction_type, TransactionType::OutIssue);
    assert_eq!(rows[0].part_code, "P1");
    assert_eq!(rows[0].warehouse_code, "W1");
}

#[tokio::test]
async fn outbound_below_zero_is_floored_but_logged_in_full() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;
    app.receive(p1.id, wh.id, 10).await;

    let movement = app.update(p1.id, wh.id, -30, TransactionType::OutScrap).await;

    assert_eq!(movement.balance.quantity_on_hand, 0);
    assert_eq!(movement.balance.available_quantity, 0);
    assert_eq!(movement.transaction.quantity, -30);
    assert_eq!(movement.requested_change, -30);
    assert_eq!(movement.applied_change, -10);
    assert!(movement.clamped);
}

#[tokio::test]
async fn first_movement_creates_the_balance_row() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    let missing = app.services.ledger.get_current_stock(p1.id, Some(wh.id)).await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));

    // A negative opening movement still creates the row, at zero.
    let movement = app.update(p1.id, wh.id, -5, TransactionType::Adjust).await;
    assert_eq!(movement.balance.quantity_on_hand, 0);
    assert_eq!(movement.balance.reserved_quantity, 0);
    assert_eq!(app.on_hand(p1.id, wh.id).await, 0);
}

#[tokio::test]
async fn zero_delta_appends_a_record_without_changing_stock() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;
    app.receive(p1.id, wh.id, 12).await;

    let movement = app.update(p1.id, wh.id, 0, TransactionType::Adjust).await;
    assert_eq!(movement.transaction.quantity, 0);
    assert_eq!(movement.balance.quantity_on_hand, 12);
    assert_eq!(movement.balance.available_quantity, 12);

    let audit = app.services.ledger.replay_balance(p1.id, wh.id).await.unwrap();
    assert_eq!(audit.transaction_count, 2);
    assert!(audit.consistent);
}

#[tokio::test]
async fn direction_mismatch_is_rejected_before_any_write() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    let err = app
        .services
        .ledger
        .update_stock(StockUpdate::new(p1.id, wh.id, -5, TransactionType::InPurchase))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = app
        .services
        .ledger
        .update_stock(StockUpdate::new(p1.id, wh.id, 5, TransactionType::OutIssue))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    assert!(app
        .services
        .ledger
        .get_current_stock(p1.id, None)
        .await
        .is_err());
    let rows = app
        .services
        .reports
        .get_transactions(TransactionQuery::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn unknown_part_or_warehouse_is_not_found() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    let err = app
        .services
        .ledger
        .update_stock(StockUpdate::new(999, wh.id, 5, TransactionType::InPurchase))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = app
        .services
        .ledger
        .update_stock(StockUpdate::new(p1.id, 999, 5, TransactionType::InPurchase))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn stock_in_defaults_reference_and_author() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    app.part("P1", "Hex bolt M6").await;

    let mut req = request("P1", wh.id, 40, "in_purchase");
    req.unit_cost = Some(dec!(12.5));
    req.notes = Some("  PO 1182 ".to_string());
    let movement = app.services.ledger.stock_in(req).await.unwrap();

    let tx = &movement.transaction;
    assert_eq!(tx.transaction_type, TransactionType::InPurchase);
    assert_eq!(tx.quantity, 40);
    assert_eq!(tx.reference_type.as_deref(), Some("MANUAL"));
    assert_eq!(tx.reference_id, None);
    assert_eq!(tx.unit_cost, dec!(12.5));
    assert_eq!(tx.notes.as_deref(), Some("PO 1182"));
    assert_eq!(tx.created_by, "system");
    assert_eq!(tx.transaction_date, app.clock.now());
}

#[tokio::test]
async fn stock_in_validates_tag_and_quantity() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    app.part("P1", "Hex bolt M6").await;

    for (quantity, tag) in [(5, "OUT_ISSUE"), (5, "ADJUST"), (5, "IN_GIFT"), (0, "IN_PURCHASE"), (-3, "IN_RETURN")] {
        let err = app
            .services
            .ledger
            .stock_in(request("P1", wh.id, quantity, tag))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::ValidationError(_)),
            "{} x{} should be rejected, got {:?}",
            tag,
            quantity,
            err
        );
    }

    let err = app
        .services
        .ledger
        .stock_in(request("NOPE", wh.id, 5, "IN_PURCHASE"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn stock_out_checks_availability_first() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    let err = app
        .services
        .ledger
        .stock_out(request("P1", wh.id, 1, "OUT_ISSUE"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InsufficientStock {
            available: 0,
            requested: 1
        }
    ));

    app.receive(p1.id, wh.id, 5).await;
    let err = app
        .services
        .ledger
        .stock_out(request("P1", wh.id, 8, "OUT_TRANSFER"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Insufficient stock: available 5, requested 8");
    assert_eq!(app.on_hand(p1.id, wh.id).await, 5);

    let movement = app
        .services
        .ledger
        .stock_out(request("P1", wh.id, 5, "OUT_ISSUE"))
        .await
        .unwrap();
    assert_eq!(movement.transaction.quantity, -5);
    assert_eq!(movement.balance.quantity_on_hand, 0);
    assert!(!movement.clamped);
}

#[tokio::test]
async fn reject_policy_refuses_to_go_negative() {
    let settings = ServiceSettings {
        negative_stock_policy: NegativeStockPolicy::Reject,
        ..ServiceSettings::default()
    };
    let app = TestApp::with_settings(settings).await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;
    app.receive(p1.id, wh.id, 10).await;

    let err = app
        .services
        .ledger
        .update_stock(StockUpdate::new(p1.id, wh.id, -30, TransactionType::OutScrap))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InsufficientStock {
            available: 10,
            requested: 30
        }
    ));

    assert_eq!(app.on_hand(p1.id, wh.id).await, 10);
    let audit = app.services.ledger.replay_balance(p1.id, wh.id).await.unwrap();
    assert_eq!(audit.transaction_count, 1);
    assert!(audit.consistent);

    // Exactly down to zero is still fine.
    let movement = app.update(p1.id, wh.id, -10, TransactionType::OutIssue).await;
    assert_eq!(movement.balance.quantity_on_hand, 0);
}

#[tokio::test]
async fn balances_per_part_and_across_warehouses() {
    let app = TestApp::new().await;
    let north = app.warehouse("N", "North").await;
    let south = app.warehouse("S", "South").await;
    let bolt = app.part("B-1", "Bolt").await;
    let anchor = app.part("A-1", "Anchor").await;

    app.receive(bolt.id, south.id, 3).await;
    app.receive(bolt.id, north.id, 7).await;
    app.receive(anchor.id, north.id, 2).await;

    let levels = app
        .services
        .ledger
        .get_current_stock(bolt.id, None)
        .await
        .unwrap();
    assert_eq!(levels.len(), 2);
    assert!(levels.iter().all(|l| l.part_code == "B-1"));

    let all = app.services.ledger.get_all_inventory(None).await.unwrap();
    let keys: Vec<(String, String)> = all
        .iter()
        .map(|l| (l.warehouse_code.clone(), l.part_code.clone()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("N".to_string(), "A-1".to_string()),
            ("N".to_string(), "B-1".to_string()),
            ("S".to_string(), "B-1".to_string()),
        ]
    );

    let south_only = app
        .services
        .ledger
        .get_all_inventory(Some(south.id))
        .await
        .unwrap();
    assert_eq!(south_only.len(), 1);
    assert_eq!(south_only[0].quantity_on_hand, 3);
    assert_eq!(south_only[0].warehouse_name, "South");
}

#[tokio::test]
async fn replay_matches_balance_after_floored_sequence() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;

    app.update(p1.id, wh.id, 10, TransactionType::InPurchase).await;
    app.update(p1.id, wh.id, -30, TransactionType::OutScrap).await;
    app.update(p1.id, wh.id, 5, TransactionType::InReturn).await;
    app.clock.advance(Duration::hours(1));
    app.update(p1.id, wh.id, -2, TransactionType::Adjust).await;

    let audit = app.services.ledger.replay_balance(p1.id, wh.id).await.unwrap();
    assert_eq!(audit.replayed_on_hand, 3);
    assert_eq!(audit.stored_on_hand, Some(3));
    assert_eq!(audit.transaction_count, 4);
    assert!(audit.consistent);
}

#[tokio::test]
async fn stock_updates_are_announced_after_commit() {
    let mut app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt M6").await;
    app.take_events();

    app.receive(p1.id, wh.id, 4).await;
    let movement = app.update(p1.id, wh.id, -9, TransactionType::OutScrap).await;

    let events = app.take_events();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        Event::StockUpdated {
            part_id: p1.id,
            warehouse_id: wh.id,
            transaction_id: movement.transaction.id,
            transaction_type: "OUT_SCRAP".to_string(),
            requested_change: -9,
            applied_change: -4,
            quantity_on_hand: 0,
        }
    );

    // A rejected movement publishes nothing.
    let _ = app
        .services
        .ledger
        .update_stock(StockUpdate::new(p1.id, wh.id, -1, TransactionType::InPurchase))
        .await;
    assert!(app.take_events().is_empty());
}
