#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use stock_ledger::{
    auth::{Actor, Role, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    config::{AppConfig, LedgerSettings},
    db::{self, DbPool},
    entities::{customer, item},
    events::{self, Event, EventSender},
    services::{
        customers::CreateCustomerRequest, items::CreateItemRequest, CustomerService, ItemService,
        LedgerEngine,
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn staff() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Staff)
}

pub fn viewer() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Viewer)
}

fn test_config(db_dir: &TempDir) -> AppConfig {
    let db_path = db_dir.path().join("ledger_test.db");
    let mut cfg = AppConfig::new(
        format!("sqlite://{}?mode=rwc", db_path.display()),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.auto_migrate = true;
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.ledger_commit_timeout_ms = 30_000;
    cfg.db_acquire_timeout_secs = 30;
    cfg
}

/// Fresh migrated SQLite database in a temporary directory.
pub async fn test_db() -> (Arc<DbPool>, TempDir) {
    test_db_with(|_| {}).await
}

/// Same as [`test_db`] with `configure` applied to the test config first.
pub async fn test_db_with(configure: impl FnOnce(&mut AppConfig)) -> (Arc<DbPool>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let mut cfg = test_config(&dir);
    configure(&mut cfg);
    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    (Arc::new(pool), dir)
}

/// Services wired to a channel the test can read events from.
pub struct LedgerHarness {
    pub db: Arc<DbPool>,
    pub ledger: LedgerEngine,
    pub items: ItemService,
    pub customers: CustomerService,
    pub events: mpsc::Receiver<Event>,
    _db_dir: TempDir,
}

impl LedgerHarness {
    pub async fn new() -> Self {
        Self::with_settings(LedgerSettings {
            commit_timeout: std::time::Duration::from_secs(30),
            ..LedgerSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: LedgerSettings) -> Self {
        let (db, dir) = test_db().await;
        Self::assemble(db, dir, settings)
    }

    /// Harness whose database and ledger follow `configure`d application config.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut settings = None;
        let (db, dir) = test_db_with(|cfg| {
            configure(cfg);
            settings = Some(cfg.ledger_settings());
        })
        .await;
        Self::assemble(db, dir, settings.unwrap_or_default())
    }

    fn assemble(db: Arc<DbPool>, dir: TempDir, settings: LedgerSettings) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let sender = EventSender::new(tx);
        Self {
            ledger: LedgerEngine::new(db.clone(), sender.clone(), settings),
            items: ItemService::new(db.clone(), sender.clone()),
            customers: CustomerService::new(db.clone(), sender),
            db,
            events: rx,
            _db_dir: dir,
        }
    }

    pub async fn seed_item(&self, sku: &str, initial_qty: Decimal, min_threshold: Decimal) -> item::Model {
        self.items
            .create_item(item_request(sku, initial_qty, min_threshold), admin())
            .await
            .expect("seed item")
    }

    pub async fn seed_customer(&self, name: &str) -> customer::Model {
        self.customers
            .create_customer(customer_request(name), admin())
            .await
            .expect("seed customer")
    }

    /// Events published so far, without waiting for more.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn item_request(sku: &str, initial_qty: Decimal, min_threshold: Decimal) -> CreateItemRequest {
    CreateItemRequest {
        sku: sku.to_string(),
        name: format!("Item {}", sku),
        category: "General".to_string(),
        unit: "pcs".to_string(),
        initial_qty,
        min_threshold,
        location: None,
    }
}

pub fn customer_request(name: &str) -> CreateCustomerRequest {
    CreateCustomerRequest {
        name: name.to_string(),
        email: None,
        phone: None,
        address: None,
    }
}

/// Full HTTP application backed by a temporary SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let (db, dir) = test_db().await;
        let cfg = test_config(&dir);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db, cfg, event_sender);
        let router = stock_ledger::build_router(state.clone());

        Self {
            router,
            state,
            _db_dir: dir,
            _event_task: event_task,
        }
    }

    /// Send a request, identifying as `actor` when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor.user_id.to_string())
                .header(ACTOR_ROLE_HEADER, actor.role.to_string());
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Decimal fields serialize as strings.
pub fn decimal_at(value: &Value, pointer: &str) -> Decimal {
    let raw = value
        .pointer(pointer)
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, value));
    match raw {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("unexpected decimal representation {}", other),
    }
}
