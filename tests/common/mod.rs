#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, PaginatorTrait, Set};
use tempfile::TempDir;
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{gift_card, inventory_variant, inventory_variant::VariantKey, order, product},
    errors::ServiceError,
    events::{Event, EventSender},
    handlers::AppServices,
    payments::{PaymentProcessor, PaymentSession, SessionRequest, WebhookVerifier},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_KEY: &str = "admin-test-key";

pub const SWEATER: VariantKey = VariantKey::new(1, 2, 3);
pub const SCARF: VariantKey = VariantKey::new(2, 1, 1);

/// Payment processor double that records every session request.
#[derive(Default)]
pub struct RecordingProcessor {
    sessions: Mutex<Vec<SessionRequest>>,
    counter: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingProcessor {
    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn fail_next_calls(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProcessor for RecordingProcessor {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentProvider("processor unavailable".into()));
        }
        self.sessions.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{}", n);
        Ok(PaymentSession {
            redirect_url: format!("https://pay.example.test/{}", id),
            id,
        })
    }
}

/// Postgres URL for contention tests; those tests are skipped when unset.
pub const POSTGRES_URL_ENV: &str = "STOREFRONT_TEST_POSTGRES_URL";

/// Postgres-backed tests share one database and run one at a time.
static POSTGRES_SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Application wired against a test database and a recording processor.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DbPool>,
    pub processor: Arc<RecordingProcessor>,
    pub verifier: WebhookVerifier,
    events: tokio::sync::Mutex<mpsc::Receiver<Event>>,
    _database_dir: Option<TempDir>,
    _postgres_guard: Option<tokio::sync::MutexGuard<'static, ()>>,
}

fn test_config(database_url: &str) -> AppConfig {
    let mut cfg = AppConfig::new(database_url, "test");
    cfg.payment_webhook_secret = WEBHOOK_SECRET.to_string();
    cfg.admin_api_key = Some(ADMIN_KEY.to_string());
    cfg
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config("sqlite::memory:")).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");
        Self::assemble(cfg, pool)
    }

    /// File-backed SQLite in WAL mode behind a pool of several connections,
    /// so settlement transactions run on separate connections.
    pub async fn shared_sqlite() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront.db").display()
        );
        let pool = db::establish_connection_with_config(&DbConfig {
            url: url.clone(),
            max_connections: 8,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("file database");
        pool.execute_unprepared("PRAGMA journal_mode=WAL")
            .await
            .expect("enable WAL");
        db::run_migrations(&pool).await.expect("migrations");

        let mut app = Self::assemble(test_config(&url), pool);
        app._database_dir = Some(dir);
        app
    }

    /// Postgres from `STOREFRONT_TEST_POSTGRES_URL`, or `None` when unset.
    ///
    /// Rows are not cleaned up between runs; callers seed fresh ids.
    pub async fn postgres() -> Option<Self> {
        let url = match std::env::var(POSTGRES_URL_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                eprintln!("{} not set; skipping Postgres contention test", POSTGRES_URL_ENV);
                return None;
            }
        };
        let guard = POSTGRES_SERIAL.lock().await;
        let pool = db::establish_connection_with_config(&DbConfig {
            url: url.clone(),
            max_connections: 8,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("postgres database");
        db::run_migrations(&pool).await.expect("migrations");

        let mut app = Self::assemble(test_config(&url), pool);
        app._postgres_guard = Some(guard);
        Some(app)
    }

    fn assemble(cfg: AppConfig, pool: DbPool) -> Self {
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);

        let processor = Arc::new(RecordingProcessor::default());
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            &cfg,
            processor.clone() as Arc<dyn PaymentProcessor>,
        );

        let verifier = WebhookVerifier::new(
            cfg.payment_webhook_secret.clone(),
            cfg.payment_webhook_tolerance_secs,
        );

        let state = AppState {
            db: db.clone(),
            config: cfg,
            event_sender,
            services,
        };

        Self {
            router: storefront_api::app_router(state.clone()),
            state,
            db,
            processor,
            verifier,
            events: tokio::sync::Mutex::new(event_rx),
            _database_dir: None,
            _postgres_guard: None,
        }
    }

    /// Standard fixture: a sweater at 30 000 and a scarf at 12 500.
    pub async fn with_catalog() -> Self {
        let app = Self::new().await;
        app.seed_product(1, "Wool Sweater", 30_000).await;
        app.seed_product(2, "Merino Scarf", 12_500).await;
        app.seed_variant(SWEATER, 5).await;
        app.seed_variant(SCARF, 3).await;
        app
    }

    pub async fn seed_product(&self, id: i32, name: &str, price: i64) {
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            price: Set(price),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");
    }

    pub async fn seed_variant(&self, variant: VariantKey, quantity: i32) {
        inventory_variant::ActiveModel {
            product_id: Set(variant.product_id),
            size_id: Set(variant.size_id),
            color_id: Set(variant.color_id),
            quantity: Set(quantity),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant");
    }

    pub async fn seed_gift_card(&self, code: &str, balance: i64) {
        self.seed_gift_card_with(code, balance, balance, true, None)
            .await;
    }

    pub async fn seed_gift_card_with(
        &self,
        code: &str,
        balance: i64,
        initial_amount: i64,
        is_enabled: bool,
        expires_at: Option<DateTime<Utc>>,
    ) {
        gift_card::ActiveModel {
            code: Set(code.to_string()),
            balance: Set(balance),
            initial_amount: Set(initial_amount),
            is_enabled: Set(is_enabled),
            expires_at: Set(expires_at),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed gift card");
    }

    pub async fn stock(&self, variant: VariantKey) -> i32 {
        inventory_variant::Entity::find_by_id((
            variant.product_id,
            variant.size_id,
            variant.color_id,
        ))
        .one(&*self.db)
        .await
        .expect("stock query")
        .expect("variant row")
        .quantity
    }

    pub async fn gift_card(&self, code: &str) -> gift_card::Model {
        gift_card::Entity::find_by_id(code.to_string())
            .one(&*self.db)
            .await
            .expect("gift card query")
            .expect("gift card row")
    }

    pub async fn card_balance(&self, code: &str) -> i64 {
        self.gift_card(code).await.balance
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("order count")
    }

    pub async fn has_order(&self, payment_reference: &str) -> bool {
        self.state
            .services
            .fulfillment
            .find_by_payment_reference(payment_reference)
            .await
            .expect("order lookup")
            .is_some()
    }

    /// Events published so far, without waiting.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().await;
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn admin_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, &[("x-api-key", ADMIN_KEY)])
            .await
    }

    /// Signs `event` with the configured secret and posts it to the webhook.
    pub async fn deliver(&self, event: &Value) -> Response {
        let payload = serde_json::to_vec(event).expect("serialize event");
        let signature = self
            .verifier
            .sign(&payload, Utc::now().timestamp())
            .expect("sign event");
        self.post_webhook(payload, Some(&signature)).await
    }

    pub async fn post_webhook(&self, payload: Vec<u8>, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(payload)).expect("build request"))
            .await
            .expect("router error during webhook")
    }
}

/// Id unlikely to collide with rows left in a shared database by earlier runs.
pub fn fresh_id() -> i32 {
    (uuid::Uuid::new_v4().as_u128() % 1_000_000_000) as i32 + 1_000
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// A `checkout.session.completed` event carrying `metadata` from an opened session.
pub fn completed_session_event(
    session_id: &str,
    payment_intent: &str,
    amount_total: i64,
    metadata: &HashMap<String, String>,
) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", payment_intent),
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": session_id,
            "payment_intent": payment_intent,
            "amount_total": amount_total,
            "currency": "nok",
            "payment_status": "paid",
            "metadata": metadata,
            "customer_details": {"email": "kari@example.com", "name": "Kari Nordmann"},
            "collected_information": {"shipping_details": {
                "name": "Kari Nordmann",
                "address": {"line1": "Storgata 1", "city": "Oslo", "postal_code": "0155", "country": "NO"}
            }}
        }}
    })
}
