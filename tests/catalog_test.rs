mod common;

use common::TestApp;
use stockroom::{
    entities::inventory_transaction::TransactionType,
    events::Event,
    services::catalog::{
        LocationRef, PartImportRow, PartInput, PartQuery, PartSortField, SortDirection,
        WarehouseInput,
    },
    LocationConflict, ServiceError,
};

fn input_at(code: &str, name: &str, locations: Vec<LocationRef>) -> PartInput {
    let mut input = PartInput::new(code, name);
    input.locations = locations;
    input
}

#[tokio::test]
async fn create_part_claims_its_locations() {
    let mut app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let catalog = &app.services.catalog;

    let created = catalog
        .create_part(input_at(
            "P1",
            "Hex bolt",
            vec![LocationRef::new(wh.id, "a-01"), LocationRef::new(wh.id, "B-02")],
        ))
        .await
        .unwrap();
    assert_eq!(created.part.code, "P1");
    assert!(created.part.is_active);
    assert_eq!(created.locations.len(), 2);

    // Location rows are created on demand and stored upper-cased.
    let locations = catalog.list_locations(wh.id).await.unwrap();
    let codes: Vec<&str> = locations.iter().map(|l| l.location_code.as_str()).collect();
    assert_eq!(codes, vec!["A-01", "B-02"]);

    let detail = catalog.get_by_id(created.part.id).await.unwrap();
    assert_eq!(detail.part, created.part);
    let claimed: Vec<&str> = detail
        .locations
        .iter()
        .map(|l| l.location_code.as_str())
        .collect();
    assert_eq!(claimed, vec!["A-01", "B-02"]);
    assert!(detail.locations.iter().all(|l| l.warehouse_code == "W1"));

    assert_eq!(catalog.get_by_code("P1").await.unwrap().id, created.part.id);
    assert_eq!(
        app.take_events(),
        vec![Event::PartCreated {
            part_id: created.part.id,
            code: "P1".to_string()
        }]
    );
}

#[tokio::test]
async fn duplicate_codes_are_rejected() {
    let app = TestApp::new().await;
    app.part("P1", "Hex bolt").await;

    let err = app
        .services
        .catalog
        .create_part(PartInput::new("P1", "Another bolt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateCode(_)));
}

#[tokio::test]
async fn claimed_locations_conflict_and_nothing_is_written() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let catalog = &app.services.catalog;
    catalog
        .create_part(input_at("P1", "Hex bolt", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap();

    let err = catalog
        .create_part(input_at(
            "P2",
            "Washer",
            vec![LocationRef::new(wh.id, "C-03"), LocationRef::new(wh.id, " a-01")],
        ))
        .await
        .unwrap_err();

    match &err {
        ServiceError::LocationConflict(conflicts) => {
            assert_eq!(
                conflicts,
                &vec![LocationConflict {
                    warehouse_code: "W1".to_string(),
                    warehouse_name: "Main".to_string(),
                    location_code: "A-01".to_string(),
                    parts: vec!["P1 - Hex bolt".to_string()],
                }]
            );
        }
        other => panic!("expected a location conflict, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "Location conflict: Main A-01 is used by P1 - Hex bolt"
    );

    assert!(matches!(
        catalog.get_by_code("P2").await,
        Err(ServiceError::NotFound(_))
    ));
    // The free location requested alongside was not created either.
    assert_eq!(catalog.list_locations(wh.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_keeps_own_locations_and_replaces_the_set() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let catalog = &app.services.catalog;
    let p1 = catalog
        .create_part(input_at("P1", "Hex bolt", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap()
        .part;
    catalog
        .create_part(input_at("P2", "Washer", vec![LocationRef::new(wh.id, "B-01")]))
        .await
        .unwrap();

    let mut input = input_at(
        "P1",
        "Hex bolt M6",
        vec![LocationRef::new(wh.id, "A-01"), LocationRef::new(wh.id, "A-02")],
    );
    input.reorder_point = 25;
    let updated = catalog.update_part(p1.id, input).await.unwrap();
    assert_eq!(updated.part.name, "Hex bolt M6");
    assert_eq!(updated.part.reorder_point, 25);
    assert_eq!(updated.locations.len(), 2);

    let err = catalog
        .update_part(
            p1.id,
            input_at("P1", "Hex bolt M6", vec![LocationRef::new(wh.id, "B-01")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LocationConflict(_)));

    // Delete-then-insert: A-01 is released when it is not requested again.
    let narrowed = catalog
        .update_part(
            p1.id,
            input_at("P1", "Hex bolt M6", vec![LocationRef::new(wh.id, "A-02")]),
        )
        .await
        .unwrap();
    assert_eq!(narrowed.locations.len(), 1);
    catalog
        .create_part(input_at("P3", "Nut", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap();

    let err = catalog
        .update_part(p1.id, PartInput::new("P2", "Renamed"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateCode(_)));
    let err = catalog
        .update_part(9999, PartInput::new("P9", "Ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn malformed_location_requests() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let catalog = &app.services.catalog;

    let err = catalog
        .create_part(input_at(
            "P1",
            "Hex bolt",
            vec![LocationRef::new(wh.id, "A-01"), LocationRef::new(wh.id, "a-01 ")],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = catalog
        .create_part(input_at("P1", "Hex bolt", vec![LocationRef::new(77, "A-01")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let mut bad = PartInput::new("P1", "Hex bolt");
    bad.quantity_per_box = 0;
    let err = catalog.create_part(bad).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = catalog
        .create_part(PartInput::new("   ", "Nameless code"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn delete_is_blocked_while_referenced() {
    let mut app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let catalog = &app.services.catalog;
    let used = app.part("P1", "Hex bolt").await;
    let spare = catalog
        .create_part(input_at("P2", "Washer", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap()
        .part;
    app.update(used.id, wh.id, 0, TransactionType::Adjust).await;

    let err = app.services.catalog.delete_part(used.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Referenced(_)));
    assert!(app.services.catalog.get_by_id(used.id).await.is_ok());

    app.take_events();
    app.services.catalog.delete_part(spare.id).await.unwrap();
    assert_eq!(app.take_events(), vec![Event::PartDeleted(spare.id)]);
    assert!(matches!(
        app.services.catalog.get_by_id(spare.id).await,
        Err(ServiceError::NotFound(_))
    ));

    // The freed location can be claimed again.
    app.services
        .catalog
        .create_part(input_at("P3", "Nut", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap();

    assert!(matches!(
        app.services.catalog.delete_part(spare.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn archived_parts_drop_out_of_default_listings() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    let p1 = app.part("P1", "Hex bolt").await;
    app.part("P2", "Washer").await;
    app.receive(p1.id, wh.id, 5).await;

    let archived = app.services.catalog.archive_part(p1.id).await.unwrap();
    assert!(!archived.is_active);

    let page = app
        .services
        .catalog
        .list_parts(PartQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "P2");

    let page = app
        .services
        .catalog
        .list_parts(PartQuery {
            include_inactive: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    // History stays reachable.
    assert_eq!(app.on_hand(p1.id, wh.id).await, 5);
}

#[tokio::test]
async fn listing_searches_sorts_and_pages() {
    let app = TestApp::new().await;
    for (code, name, reorder_point) in [
        ("BLT-10", "Carriage bolt", 5),
        ("BLT-02", "Hex BOLT", 30),
        ("NUT-01", "Lock nut", 10),
        ("WSH-01", "Washer for bolts", 20),
        ("SCR-01", "Wood screw", 1),
    ] {
        app.part_with(code, name, reorder_point, 0).await;
    }
    let catalog = &app.services.catalog;

    let page = catalog
        .list_parts(PartQuery {
            search: Some("bolt".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let codes: Vec<&str> = page.items.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["BLT-02", "BLT-10", "WSH-01"]);

    let page = catalog
        .list_parts(PartQuery {
            search: Some("blt".to_string()),
            sort: PartSortField::ReorderPoint,
            direction: SortDirection::Desc,
            ..Default::default()
        })
        .await
        .unwrap();
    let codes: Vec<&str> = page.items.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["BLT-02", "BLT-10"]);

    let page = catalog
        .list_parts(PartQuery {
            page: 2,
            per_page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    let codes: Vec<&str> = page.items.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["NUT-01", "SCR-01"]);
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.page, 2);

    let err = catalog
        .list_parts(PartQuery {
            per_page: Some(0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn warehouses_and_locations() {
    let app = TestApp::new().await;
    let catalog = &app.services.catalog;
    let zulu = app.warehouse("Z", "Zulu yard").await;
    app.warehouse("A", "Annex").await;

    let err = catalog
        .create_warehouse(WarehouseInput {
            code: " Z ".to_string(),
            name: "Other".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateCode(_)));

    let names: Vec<String> = catalog
        .list_warehouses()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec!["Annex", "Zulu yard"]);
    assert_eq!(catalog.get_warehouse_by_code("Z").await.unwrap().id, zulu.id);
    assert!(matches!(
        catalog.get_warehouse_by_code("Q").await,
        Err(ServiceError::NotFound(_))
    ));

    let location = catalog
        .create_location(zulu.id, "r1-s2", Some("Rack 1".to_string()))
        .await
        .unwrap();
    assert_eq!(location.location_code, "R1-S2");
    let err = catalog
        .create_location(zulu.id, "R1-S2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateCode(_)));
    let err = catalog.create_location(999, "X", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // An existing but unclaimed location can be taken by a part.
    let detail = catalog
        .create_part(input_at("P1", "Hex bolt", vec![LocationRef::new(zulu.id, "R1-S2")]))
        .await
        .unwrap();
    assert_eq!(detail.locations[0].location_id, location.id);
}

#[tokio::test]
async fn part_import_reports_bad_rows() {
    let app = TestApp::new().await;
    let wh = app.warehouse("W1", "Main").await;
    app.services
        .catalog
        .create_part(input_at("OLD", "Existing", vec![LocationRef::new(wh.id, "A-01")]))
        .await
        .unwrap();

    let row = |code: &str, name: &str, qty: Option<&str>, locations: Option<&str>| PartImportRow {
        code: code.to_string(),
        name: name.to_string(),
        description: None,
        unit: None,
        quantity_per_box: qty.map(str::to_string),
        locations: locations.map(str::to_string),
    };

    let report = app
        .services
        .catalog
        .import_parts(vec![
            row("P1", "Hex bolt", Some("50"), Some("W1:B-01, W1:B-02")),
            row("", "No code", None, None),
            row("P2", "Washer", Some("fifty"), None),
            row("P3", "Nut", None, Some("W9:A-01")),
            row("P4", "Screw", None, Some("W1-A01")),
            row("OLD", "Again", None, None),
            row("P5", "Rivet", None, Some("W1:a-01")),
            row("P6", "Pin", None, Some("W1:C-01,W1:c-01")),
            row("P7", "Clip", Some(" 10 "), None),
        ])
        .await
        .unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 7);
    let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![2, 3, 4, 5, 6, 7, 8]);

    let p1 = app.services.catalog.get_by_code("P1").await.unwrap();
    assert_eq!(p1.quantity_per_box, 50);
    assert_eq!(p1.unit, "pcs");
    let p1 = app.services.catalog.get_by_id(p1.id).await.unwrap();
    assert_eq!(p1.locations.len(), 2);
    assert_eq!(
        app.services
            .catalog
            .get_by_code("P7")
            .await
            .unwrap()
            .quantity_per_box,
        10
    );
}
