//! Coordinator behavior driven through the assembled engine: first-load
//! seeding, targeted refreshes, stale-fetch discarding, error recovery, and
//! the offline write path.

mod common;

use chrono::Utc;
use common::{test_config, FakeBackend, ScriptedTransport};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tillsync::client::sync::StateSnapshot;
use tillsync::client::{BackendClient, LocalDatabase, SyncEngine, SyncPhase};
use tillsync::shared::config::Config;
use tillsync::shared::models::{Bill, MenuItem, Order, OrderStatus, Payment, PaymentMethod};
use uuid::Uuid;

async fn engine_with(
    backend: &FakeBackend,
    transport: Arc<ScriptedTransport>,
    db_path: &Path,
) -> SyncEngine {
    let config = test_config(&backend.url(), db_path);
    SyncEngine::with_transport(config, transport).await.unwrap()
}

async fn wait_ready(engine: &SyncEngine) {
    let mut phase = engine.phase();
    for _ in 0..200 {
        if phase.borrow().is_ready() {
            return;
        }
        let _ = tokio::time::timeout(Duration::from_millis(50), phase.changed()).await;
    }
    panic!("engine never reached ready");
}

async fn wait_snapshot(engine: &SyncEngine, what: &str, pred: impl Fn(&StateSnapshot) -> bool) {
    let state = engine.state();
    for _ in 0..200 {
        if pred(&state.borrow()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

fn order(n: i64) -> Order {
    Order {
        id: Uuid::new_v4(),
        table_label: Some(format!("t{n}")),
        lines: vec![],
        status: OrderStatus::Pending,
        total_cents: n * 100,
        placed_at: Utc::now(),
    }
}

#[tokio::test]
async fn seeds_empty_backend_menu_from_local_cache_on_first_load() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("local.db");

    // A previous session cached three menu items; the backend has none
    let cached = vec![
        MenuItem::new("Flat White", 450),
        MenuItem::new("Toastie", 750),
        MenuItem::new("Affogato", 520),
    ];
    {
        let db = LocalDatabase::open(&db_path).await.unwrap();
        db.replace_cached_menu_items(&cached).await.unwrap();
    }

    let transport = ScriptedTransport::new();
    let _frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &db_path).await;
    engine.start().await;
    wait_ready(&engine).await;

    // All three items were pushed, first writer seeds the shared database
    let created = backend.menu_created.lock().unwrap().clone();
    assert_eq!(created.len(), 3);

    // The snapshot adopts the seeded records with their identifiers intact
    let snapshot = engine.state().borrow().clone();
    assert_eq!(snapshot.menu_items, cached);

    engine.shutdown().await;
}

#[tokio::test]
async fn non_menu_collections_adopt_backend_value_even_when_empty() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("local.db");

    // Cached categories exist locally but the backend has none; unlike the
    // menu, categories are never seeded upstream
    {
        let db = LocalDatabase::open(&db_path).await.unwrap();
        db.replace_cached_categories(&[tillsync::shared::models::Category {
            id: Uuid::new_v4(),
            name: "Hot Drinks".to_string(),
            sort_order: 1,
        }])
        .await
        .unwrap();
    }

    let transport = ScriptedTransport::new();
    let _frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &db_path).await;
    engine.start().await;
    wait_ready(&engine).await;

    let snapshot = engine.state().borrow().clone();
    assert!(snapshot.categories.is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn bill_update_refreshes_bills_and_transactions_together() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &dir.path().join("local.db")).await;
    engine.start().await;
    wait_ready(&engine).await;

    let bill = Bill {
        id: Uuid::new_v4(),
        order_ids: vec![],
        table_label: Some("t3".to_string()),
        total_cents: 2500,
        settled: true,
        opened_at: Utc::now(),
    };
    let payment = Payment {
        id: Uuid::new_v4(),
        bill_id: bill.id,
        amount_cents: 2500,
        method: PaymentMethod::Card,
        paid_at: Utc::now(),
    };
    backend.set_collection("/api/bills", serde_json::to_value(vec![&bill]).unwrap());
    backend.set_collection(
        "/api/transactions",
        serde_json::to_value(vec![&payment]).unwrap(),
    );

    frames
        .send(Ok(r#"{"type":"BILL_UPDATE","data":{}}"#.to_string()))
        .unwrap();

    wait_snapshot(&engine, "bills and payments to refresh", |s| {
        s.bills.len() == 1 && s.payments.len() == 1
    })
    .await;
    let snapshot = engine.state().borrow().clone();
    assert_eq!(snapshot.bills[0].id, bill.id);
    assert_eq!(snapshot.payments[0].id, payment.id);

    engine.shutdown().await;
}

#[tokio::test]
async fn stale_in_flight_fetch_is_discarded() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &dir.path().join("local.db")).await;
    engine.start().await;
    wait_ready(&engine).await;

    // First notification issues a fetch that will answer slowly with the
    // old value
    let stale = order(1);
    backend.set_collection("/api/orders", serde_json::to_value(vec![&stale]).unwrap());
    *backend.get_delay.lock().unwrap() = Some(Duration::from_millis(400));
    frames
        .send(Ok(r#"{"type":"ORDER_UPDATE","data":{}}"#.to_string()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Second notification supersedes it and answers immediately with the
    // new value
    let fresh = order(2);
    *backend.get_delay.lock().unwrap() = None;
    backend.set_collection("/api/orders", serde_json::to_value(vec![&fresh]).unwrap());
    frames
        .send(Ok(r#"{"type":"ORDER_UPDATE","data":{}}"#.to_string()))
        .unwrap();

    wait_snapshot(&engine, "fresh orders to apply", |s| {
        s.orders.len() == 1 && s.orders[0].id == fresh.id
    })
    .await;

    // The slow fetch completes afterwards and must not win
    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = engine.state().borrow().clone();
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.orders[0].id, fresh.id);

    engine.shutdown().await;
}

#[tokio::test]
async fn notification_burst_converges_to_backend_state() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &dir.path().join("local.db")).await;
    engine.start().await;
    wait_ready(&engine).await;

    let mut orders = Vec::new();
    for n in 1..=5 {
        orders.push(order(n));
        backend.set_collection("/api/orders", serde_json::to_value(&orders).unwrap());
        frames
            .send(Ok(r#"{"type":"ORDER_UPDATE","data":{}}"#.to_string()))
            .unwrap();
    }
    // Notifications are idempotent triggers; a duplicate only refetches
    frames
        .send(Ok(r#"{"type":"ORDER_UPDATE","data":{}}"#.to_string()))
        .unwrap();

    wait_snapshot(&engine, "orders to converge", |s| s.orders.len() == 5).await;
    let snapshot = engine.state().borrow().clone();
    let ids: Vec<Uuid> = snapshot.orders.iter().map(|o| o.id).collect();
    let expected: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, expected);

    engine.shutdown().await;
}

#[tokio::test]
async fn health_probe_treats_error_status_as_unreachable() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&backend.url(), &dir.path().join("local.db"));
    let api = BackendClient::new(&config).unwrap();

    assert!(api.check_health().await);
    backend.set_healthy(false);
    assert!(!api.check_health().await);
}

#[tokio::test]
async fn unreachable_backend_surfaces_error_and_manual_retry_recovers() {
    let backend = FakeBackend::start().await;
    backend.set_healthy(false);
    let dir = tempfile::tempdir().unwrap();

    // A long monitor interval keeps automatic recovery out of the picture,
    // so only the manual retry can bring the engine up
    let config = Config::builder()
        .server_url(backend.url())
        .database_path(dir.path().join("local.db"))
        .sync_interval(Duration::from_secs(3600))
        .reconnect_base_delay(Duration::from_millis(20))
        .build()
        .unwrap();
    let transport = ScriptedTransport::new();
    let _frames = transport.push_accept();
    let engine = SyncEngine::with_transport(config, transport).await.unwrap();
    engine.start().await;

    let mut phase = engine.phase();
    for _ in 0..200 {
        if matches!(&*phase.borrow(), SyncPhase::Error(_)) {
            break;
        }
        let _ = tokio::time::timeout(Duration::from_millis(50), phase.changed()).await;
    }
    let current = phase.borrow().clone();
    let SyncPhase::Error(reason) = current else {
        panic!("expected error phase, got {current:?}");
    };
    assert!(reason.contains("unreachable"));

    backend.set_healthy(true);
    engine.retry();
    wait_ready(&engine).await;

    engine.shutdown().await;
}

#[tokio::test]
async fn offline_writes_replay_in_order_once_connectivity_returns() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let _frames = transport.push_accept();
    let engine = engine_with(&backend, transport, &dir.path().join("local.db")).await;
    engine.start().await;
    wait_ready(&engine).await;

    let mut online = engine.online();
    if !*online.borrow() {
        tokio::time::timeout(Duration::from_secs(5), online.changed())
            .await
            .expect("monitor never saw the backend healthy")
            .unwrap();
    }

    // Mid-session outage
    backend.set_healthy(false);
    while *online.borrow() {
        online.changed().await.unwrap();
    }

    engine
        .submit_order(serde_json::json!({ "table": "2", "n": 1 }))
        .await
        .unwrap();
    engine
        .submit_order(serde_json::json!({ "table": "2", "n": 2 }))
        .await
        .unwrap();
    assert_eq!(engine.pending_mutations().await.unwrap(), 2);
    assert!(backend.orders_received.lock().unwrap().is_empty());

    // Connectivity returns; the monitor drains on the transition
    backend.set_healthy(true);

    wait_snapshot(&engine, "pending indicator to return to 0", |s| {
        s.pending_mutations == 0
    })
    .await;
    assert_eq!(engine.pending_mutations().await.unwrap(), 0);

    let received = backend.orders_received.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0]["n"], 1);
    assert_eq!(received[1]["n"], 2);

    engine.shutdown().await;
}
