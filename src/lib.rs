//! Storefront checkout API
//!
//! Prices carts against the catalog, settles gift-card-covered orders
//! directly, opens processor payment sessions for everything else and turns
//! signed payment callbacks into orders exactly once.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod payments;
pub mod request_context;
pub mod services;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::middleware_helpers::{request_id_middleware, require_admin_key, AdminKey};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes(admin_key: AdminKey) -> Router<AppState> {
    // Back-office routes require the admin API key
    let admin = Router::new()
        .route("/gift-cards", post(handlers::admin::issue_gift_card))
        .route("/gift-cards/:code", patch(handlers::admin::adjust_gift_card))
        .route("/inventory/restock", post(handlers::inventory::restock))
        .route_layer(from_fn_with_state(admin_key, require_admin_key));

    // Payment webhook (no API key, but signature-verified)
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        post(handlers::payment_webhooks::payment_webhook),
    );

    Router::new()
        .route("/health", get(health_check))
        .route("/checkout", post(handlers::checkout::checkout))
        .route("/gift-cards/:code", get(handlers::gift_cards::get_gift_card))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/inventory/:product_id/:size_id/:color_id",
            get(handlers::inventory::get_stock),
        )
        .merge(payment_webhook)
        .nest("/admin", admin)
}

/// Builds the CORS layer from configuration.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_development() {
        info!("Using permissive CORS in development");
        CorsLayer::permissive()
    } else {
        warn!("APP__CORS_ALLOWED_ORIGINS not set; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router with tracing, CORS and request ids applied.
pub fn app_router(state: AppState) -> Router {
    let admin_key = AdminKey(state.config.admin_api_key.clone());
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/", get(|| async { "storefront-api up" }))
        .nest("/api/v1", api_v1_routes(admin_key))
        .layer(request_context::http_trace_layer())
        .layer(cors)
        // Outermost so every span and error body carries the request id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };
    let status = if db_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": db_status,
            "checks": { "database": db_status },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
