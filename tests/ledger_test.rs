mod common;

use assert_matches::assert_matches;
use common::{admin, staff, viewer, LedgerHarness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use stock_ledger::{
    entities::{
        customer,
        AlertType,
        item::{self, Entity as Item},
        movement::{self, Entity as Movement},
        MovementKind,
    },
    errors::ServiceError,
    events::Event,
    services::{
        customers::UpdateCustomerRequest,
        items::UpdateItemRequest,
        ledger::{MovementOptions, MovementRequest, OPENING_BALANCE_REASON},
    },
};
use uuid::Uuid;

fn request(item_id: Uuid, kind: MovementKind, magnitude: Decimal, reason: &str) -> MovementRequest {
    MovementRequest {
        item_id,
        kind,
        magnitude,
        reason: reason.to_string(),
        options: MovementOptions::default(),
    }
}

async fn movement_count(harness: &LedgerHarness, item_id: Uuid) -> u64 {
    Movement::find()
        .filter(movement::Column::ItemId.eq(item_id))
        .count(harness.db.as_ref())
        .await
        .expect("count movements")
}

async fn deactivate(harness: &LedgerHarness, customer: &customer::Model) {
    harness
        .customers
        .update_customer(
            customer.id,
            UpdateCustomerRequest {
                status: Some(customer::CustomerStatus::Inactive),
                ..Default::default()
            },
            admin(),
        )
        .await
        .expect("deactivate customer");
}

#[tokio::test]
async fn opening_balance_is_recorded_as_a_single_adjust_movement() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-OPEN", dec!(25), dec!(5)).await;

    assert_eq!(item.current_qty, dec!(25));
    assert_eq!(item.version, 1);

    let history = harness.ledger.movement_history(item.id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    let opening = &history[0];
    assert_eq!(opening.kind, MovementKind::Adjust);
    assert_eq!(opening.delta, dec!(25));
    assert_eq!(opening.reason, OPENING_BALANCE_REASON);
    assert_eq!(opening.sequence, 1);
}

#[tokio::test]
async fn zero_opening_balance_creates_no_movement() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-EMPTY", Decimal::ZERO, dec!(1)).await;

    assert_eq!(item.current_qty, Decimal::ZERO);
    assert_eq!(item.version, 0);
    assert_eq!(movement_count(&harness, item.id).await, 0);
}

#[tokio::test]
async fn receiving_stock_increases_balance() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-IN", dec!(10), dec!(5)).await;

    let outcome = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(4), "PO receipt"), staff())
        .await
        .unwrap();

    assert_eq!(outcome.previous_qty, dec!(10));
    assert_eq!(outcome.new_qty, dec!(14));
    assert_eq!(outcome.movement.delta, dec!(4));
    assert_eq!(outcome.movement.sequence, 2);

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.current_qty, dec!(14));
    assert_eq!(balance.version, 2);
    assert!(!balance.low_stock);
}

#[tokio::test]
async fn movement_signs_follow_kind() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-SIGN", dec!(20), dec!(0)).await;

    let received = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(-5), "receipt"), staff())
        .await
        .unwrap();
    assert_eq!(received.movement.delta, dec!(5));

    let shipped = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(5), "shipment"), staff())
        .await
        .unwrap();
    assert_eq!(shipped.movement.delta, dec!(-5));

    let counted = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Adjust, dec!(-3), "cycle count"), staff())
        .await
        .unwrap();
    assert_eq!(counted.movement.delta, dec!(-3));
    assert_eq!(counted.new_qty, dec!(17));
}

#[tokio::test]
async fn staff_cannot_take_stock_negative() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-A", dec!(10), dec!(5)).await;

    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(12), "shipment"), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(ref msg) if msg.contains("admin override"));

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.current_qty, dec!(10));
    // Only the opening balance exists
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn admin_needs_explicit_override_for_negative_stock() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-B", dec!(10), dec!(5)).await;

    let mut req = request(item.id, MovementKind::Out, dec!(12), "write-off");
    let err = harness
        .ledger
        .submit_movement(req.clone(), admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(ref msg) if msg.contains("allow_negative"));
    assert_eq!(movement_count(&harness, item.id).await, 1);

    req.options.allow_negative = true;
    let outcome = harness.ledger.submit_movement(req, admin()).await.unwrap();
    assert_eq!(outcome.new_qty, dec!(-2));
    assert_eq!(outcome.movement.delta, dec!(-12));

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.current_qty, dec!(-2));
    assert_eq!(movement_count(&harness, item.id).await, 2);
}

#[tokio::test]
async fn override_flag_is_ignored_when_stock_stays_non_negative() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-FLAG", dec!(10), dec!(0)).await;

    let mut req = request(item.id, MovementKind::Out, dec!(10), "empty the bin");
    req.options.allow_negative = true;
    let outcome = harness.ledger.submit_movement(req, staff()).await.unwrap();
    assert_eq!(outcome.new_qty, Decimal::ZERO);
}

#[tokio::test]
async fn viewers_cannot_record_movements() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-VIEW", dec!(10), dec!(0)).await;

    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(1), "receipt"), viewer())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn repeated_invalid_submission_fails_the_same_way() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-IDEM", dec!(3), dec!(0)).await;
    let req = request(item.id, MovementKind::Out, dec!(8), "shipment");

    for _ in 0..2 {
        let err = harness
            .ledger
            .submit_movement(req.clone(), staff())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Forbidden(_));
    }

    let zero = request(item.id, MovementKind::Adjust, Decimal::ZERO, "noop");
    for _ in 0..2 {
        let err = harness
            .ledger
            .submit_movement(zero.clone(), staff())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.current_qty, dec!(3));
    assert_eq!(balance.version, 1);
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn blank_reason_is_rejected() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-REASON", dec!(3), dec!(0)).await;

    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(1), "   "), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let harness = LedgerHarness::new().await;

    let err = harness
        .ledger
        .submit_movement(request(Uuid::new_v4(), MovementKind::In, dec!(1), "receipt"), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert_matches!(
        harness.ledger.movement_history(Uuid::new_v4(), None).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn unknown_item_is_not_found_even_with_an_unknown_customer() {
    let harness = LedgerHarness::new().await;

    let mut req = request(Uuid::new_v4(), MovementKind::Out, dec!(1), "delivery");
    req.options.customer_id = Some(Uuid::new_v4());
    let err = harness.ledger.submit_movement(req, staff()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(ref msg) if msg.contains("Item"));
}

#[tokio::test]
async fn archived_items_accept_no_movements() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-ARCH", dec!(4), dec!(0)).await;
    harness
        .items
        .update_item(
            item.id,
            UpdateItemRequest {
                status: Some(item::ItemStatus::Archived),
                ..Default::default()
            },
            admin(),
        )
        .await
        .unwrap();

    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(1), "late receipt"), admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn delivery_to_inactive_customer_is_rejected() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-D", dec!(10), dec!(0)).await;
    let customer = harness.seed_customer("Dormant Co").await;
    deactivate(&harness, &customer).await;

    let mut req = request(item.id, MovementKind::Out, dec!(2), "delivery");
    req.options.customer_id = Some(customer.id);
    let err = harness.ledger.submit_movement(req, staff()).await.unwrap_err();

    assert_matches!(err, ServiceError::InvalidInput(ref msg) if msg.contains("inactive"));
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn delivery_to_unknown_customer_is_rejected() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-GHOST", dec!(10), dec!(0)).await;

    let mut req = request(item.id, MovementKind::Out, dec!(2), "delivery");
    req.options.customer_id = Some(Uuid::new_v4());
    let err = harness.ledger.submit_movement(req, staff()).await.unwrap_err();

    assert_matches!(err, ServiceError::InvalidInput(_));
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn deliveries_are_listed_per_customer() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-DEL", dec!(10), dec!(0)).await;
    let customer = harness.seed_customer("Acme").await;
    let other = harness.seed_customer("Globex").await;

    let mut req = request(item.id, MovementKind::Out, dec!(3), "delivery");
    req.options.customer_id = Some(customer.id);
    req.options.delivery_note = Some("DN-001".to_string());
    req.options.ref_doc = Some("SO-42".to_string());
    let outcome = harness.ledger.submit_movement(req, staff()).await.unwrap();
    assert_eq!(outcome.movement.customer_id, Some(customer.id));
    assert_eq!(outcome.movement.delivery_note.as_deref(), Some("DN-001"));
    assert_eq!(outcome.movement.ref_doc.as_deref(), Some("SO-42"));

    let deliveries = harness.ledger.customer_deliveries(customer.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].delta, dec!(-3));

    assert!(harness
        .ledger
        .customer_deliveries(other.id)
        .await
        .unwrap()
        .is_empty());
    assert_matches!(
        harness.ledger.customer_deliveries(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn history_is_newest_first_and_respects_limit() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-HIST", dec!(1), dec!(0)).await;

    for qty in [dec!(2), dec!(3), dec!(4)] {
        harness
            .ledger
            .submit_movement(request(item.id, MovementKind::In, qty, "receipt"), staff())
            .await
            .unwrap();
    }

    let history = harness.ledger.movement_history(item.id, None).await.unwrap();
    let sequences: Vec<i64> = history.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![4, 3, 2, 1]);

    let limited = harness.ledger.movement_history(item.id, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].delta, dec!(4));
}

#[tokio::test]
async fn recent_movements_span_items() {
    let harness = LedgerHarness::new().await;
    let first = harness.seed_item("SKU-R1", dec!(1), dec!(0)).await;
    let second = harness.seed_item("SKU-R2", dec!(2), dec!(0)).await;

    let recent = harness.ledger.recent_movements(None).await.unwrap();
    assert_eq!(recent.len(), 2);
    let items: Vec<Uuid> = recent.iter().map(|m| m.item_id).collect();
    assert!(items.contains(&first.id));
    assert!(items.contains(&second.id));

    assert_eq!(harness.ledger.recent_movements(Some(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cached_balance_matches_movement_log() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-SUM", dec!(8), dec!(0)).await;

    let steps = [
        (MovementKind::In, dec!(2.5)),
        (MovementKind::Out, dec!(1.25)),
        (MovementKind::Adjust, dec!(-0.5)),
        (MovementKind::In, dec!(16)),
    ];
    for (kind, qty) in steps {
        harness
            .ledger
            .submit_movement(request(item.id, kind, qty, "activity"), staff())
            .await
            .unwrap();
    }

    let check = harness.ledger.recompute_balance(item.id).await.unwrap();
    assert!(check.is_consistent());
    assert_eq!(check.cached, dec!(24.75));
    assert_eq!(check.derived, dec!(24.75));
}

#[tokio::test]
async fn low_stock_event_fires_once_when_threshold_is_crossed() {
    let mut harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-LOW", dec!(10), dec!(5)).await;
    harness.drain_events();

    harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(6), "shipment"), staff())
        .await
        .unwrap();
    harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(1), "shipment"), staff())
        .await
        .unwrap();

    let events = harness.drain_events();
    let low: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::LowStockDetected { .. }))
        .collect();
    assert_eq!(low.len(), 1);
    assert_matches!(
        low[0],
        Event::LowStockDetected { item_id, current_qty, .. }
            if *item_id == item.id && *current_qty == dec!(4)
    );

    let recorded = events
        .iter()
        .filter(|e| matches!(e, Event::MovementRecorded { .. }))
        .count();
    assert_eq!(recorded, 2);

    let low_items = harness.items.low_stock_items().await.unwrap();
    assert_eq!(low_items.len(), 1);
    assert_eq!(low_items[0].id, item.id);
}

#[tokio::test]
async fn low_stock_alerts_are_kept_newest_first() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-ALERT", dec!(10), dec!(3)).await;
    assert!(harness.ledger.item_alerts(item.id, None).await.unwrap().is_empty());

    let submit = |kind, qty| {
        harness
            .ledger
            .submit_movement(request(item.id, kind, qty, "floor count"), staff())
    };
    submit(MovementKind::Out, dec!(6)).await.unwrap();
    let first = submit(MovementKind::Out, dec!(2)).await.unwrap();
    submit(MovementKind::Out, dec!(1)).await.unwrap();
    submit(MovementKind::In, dec!(10)).await.unwrap();
    let second = submit(MovementKind::Out, dec!(10.5)).await.unwrap();

    let alerts = harness.ledger.item_alerts(item.id, None).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].movement_id, second.movement.id);
    assert_eq!(alerts[0].current_qty, dec!(0.5));
    assert_eq!(alerts[1].movement_id, first.movement.id);
    assert_eq!(alerts[1].current_qty, dec!(2));
    assert!(alerts
        .iter()
        .all(|a| a.item_id == item.id && a.alert_type == AlertType::LowStock && a.min_threshold == dec!(3)));
    assert!(alerts[0].created_at >= alerts[1].created_at);

    let latest = harness.ledger.item_alerts(item.id, Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, alerts[0].id);

    assert_matches!(
        harness.ledger.item_alerts(Uuid::new_v4(), None).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn denied_movement_raises_no_alert() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-ALERT-DENY", dec!(5), dec!(2)).await;

    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(8), "oversell"), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(harness.ledger.item_alerts(item.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn quantities_storage_would_round_are_rejected() {
    let harness = LedgerHarness::new().await;

    let err = harness
        .items
        .create_item(
            common::item_request("FR-2", dec!(1234567890.123456789), dec!(0)),
            admin(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let item = harness.seed_item("FR-3", dec!(99999990), dec!(0)).await;
    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(0.0000001), "dust"), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    // The movement itself is storable but the balance it produces is not
    let err = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(10), "overflow"), staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(ref msg) if msg.contains("FR-3"));
    assert_eq!(movement_count(&harness, item.id).await, 1);
}

#[tokio::test]
async fn fractional_quantities_round_trip_exactly() {
    let harness = LedgerHarness::new().await;
    let item = harness
        .seed_item("FR-1", dec!(12345678.901234), dec!(0.000001))
        .await;
    assert_eq!(item.current_qty, dec!(12345678.901234));
    assert_eq!(item.min_threshold, dec!(0.000001));

    let outcome = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(0.000007), "sample"), staff())
        .await
        .unwrap();
    assert_eq!(outcome.new_qty, dec!(12345678.901227));

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.current_qty, outcome.new_qty);
    let check = harness.ledger.recompute_balance(item.id).await.unwrap();
    assert_eq!(check.cached, dec!(12345678.901227));
    assert_eq!(check.derived, dec!(12345678.901227));
    assert!(check.is_consistent());

    let history = harness.ledger.movement_history(item.id, None).await.unwrap();
    assert_eq!(history[0].delta, dec!(-0.000007));
}

#[tokio::test]
async fn drifted_balance_is_detected_and_repaired() {
    let mut harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-DRIFT", dec!(10), dec!(0)).await;
    harness
        .ledger
        .submit_movement(request(item.id, MovementKind::Out, dec!(4), "shipment"), staff())
        .await
        .unwrap();

    // Simulate a crash that left the cache behind the log
    Item::update_many()
        .col_expr(item::Column::CurrentQty, Expr::value(dec!(99)))
        .filter(item::Column::Id.eq(item.id))
        .exec(harness.db.as_ref())
        .await
        .unwrap();

    let check = harness.ledger.recompute_balance(item.id).await.unwrap();
    assert!(!check.is_consistent());
    assert_eq!(check.drift, dec!(93));

    assert_matches!(
        harness.ledger.repair_balance(item.id, staff()).await,
        Err(ServiceError::Forbidden(_))
    );

    harness.drain_events();
    let before = harness.ledger.repair_balance(item.id, admin()).await.unwrap();
    assert_eq!(before.cached, dec!(99));
    assert_eq!(before.derived, dec!(6));

    let after = harness.ledger.recompute_balance(item.id).await.unwrap();
    assert!(after.is_consistent());
    assert_eq!(after.cached, dec!(6));
    assert_eq!(movement_count(&harness, item.id).await, 2);

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::BalanceRepaired { repaired_qty, .. } if *repaired_qty == dec!(6))));

    // Commits keep working after the version bump
    let outcome = harness
        .ledger
        .submit_movement(request(item.id, MovementKind::In, dec!(1), "receipt"), staff())
        .await
        .unwrap();
    assert_eq!(outcome.new_qty, dec!(7));
    assert_eq!(outcome.movement.sequence, 4);
}

#[tokio::test]
async fn repairing_a_consistent_balance_changes_nothing() {
    let harness = LedgerHarness::new().await;
    let item = harness.seed_item("SKU-OK", dec!(5), dec!(0)).await;

    let check = harness.ledger.repair_balance(item.id, admin()).await.unwrap();
    assert!(check.is_consistent());

    let balance = harness.ledger.current_balance(item.id).await.unwrap();
    assert_eq!(balance.version, 1);
}
