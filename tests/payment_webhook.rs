//! Processor callbacks: authentication, idempotent settlement and terminal failures.

mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{completed_session_event, response_json, TestApp, SWEATER};
use sea_orm::ConnectionTrait;
use serde_json::json;
use storefront_api::events::{Event, SettlementPath};

/// Opens a session for one sweater with `GIFT-BETA-0002` covering 10 000.
async fn open_partial_session(app: &TestApp) -> storefront_api::payments::SessionRequest {
    app.seed_gift_card("GIFT-BETA-0002", 10_000).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "items": [{"product_id": 1, "size_id": 2, "color_id": 3, "quantity": 1, "unit_price": 30_000}],
                "gift_card_code": "GIFT-BETA-0002",
                "customer": {"email": "kari@example.com"},
            })),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.processor.sessions().pop().expect("session opened")
}

#[tokio::test]
async fn completed_payment_settles_the_order_and_drains_the_gift_card() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;

    let response = app
        .deliver(&completed_session_event(
            "cs_test_1",
            "pi_settle_1",
            20_000,
            &session.metadata,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = response_json(response).await;
    assert_eq!(ack["received"], true);
    assert_eq!(ack["outcome"], "settled");

    assert_eq!(app.card_balance("GIFT-BETA-0002").await, 0);
    assert_eq!(app.stock(SWEATER).await, 4);

    let order_id = ack["order_id"].as_str().unwrap().to_string();
    let order = response_json(
        app.request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, &[])
            .await,
    )
    .await;
    assert_eq!(order["order"]["amount"], 20_000);
    assert_eq!(order["order"]["discount_amount"], 10_000);
    assert_eq!(order["order"]["payment_reference"], "pi_settle_1");
    assert_eq!(order["order"]["gift_card_code"], "GIFT-BETA-0002");
    assert_eq!(order["order"]["currency"], "nok");
    assert_eq!(order["order"]["shipping_details"]["address"]["city"], "Oslo");
    assert_eq!(order["order"]["customer_details"]["name"], "Kari Nordmann");

    let events = app.drain_events().await;
    assert!(events.iter().any(|event| matches!(
        event,
        Event::OrderSettled { path: SettlementPath::Processor, amount: 20_000, .. }
    )));
}

#[tokio::test]
async fn redelivered_event_creates_exactly_one_order() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;
    let event = completed_session_event("cs_test_1", "pi_dup_1", 20_000, &session.metadata);

    let first = response_json(app.deliver(&event).await).await;
    let second = app.deliver(&event).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = response_json(second).await;

    assert_eq!(first["outcome"], "settled");
    assert_eq!(second["outcome"], "duplicate");
    assert_eq!(first["order_id"], second["order_id"]);

    assert_eq!(app.order_count().await, 1);
    assert_eq!(app.stock(SWEATER).await, 4);
    assert_eq!(app.card_balance("GIFT-BETA-0002").await, 0);
}

#[tokio::test]
async fn unsigned_or_forged_events_are_rejected() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;
    let payload = serde_json::to_vec(&completed_session_event(
        "cs_test_1",
        "pi_forged",
        20_000,
        &session.metadata,
    ))
    .unwrap();

    let missing = app.post_webhook(payload.clone(), None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(missing).await["code"], "invalid_signature");

    let forged = format!("t={},v1={}", Utc::now().timestamp(), "ab".repeat(32));
    let response = app.post_webhook(payload, Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock(SWEATER).await, 5);
}

#[tokio::test]
async fn informational_events_are_acknowledged_and_ignored() {
    let app = TestApp::with_catalog().await;

    let expired = app
        .deliver(&json!({
            "id": "evt_expired",
            "type": "checkout.session.expired",
            "data": {"object": {"id": "cs_test_9"}}
        }))
        .await;
    assert_eq!(expired.status(), StatusCode::OK);
    let body = response_json(expired).await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["event_type"], "checkout.session.expired");

    let unknown = response_json(
        app.deliver(&json!({
            "id": "evt_other",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        }))
        .await,
    )
    .await;
    assert_eq!(unknown["outcome"], "ignored");
    assert_eq!(unknown["event_type"], "customer.created");

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unpaid_completion_waits_for_async_confirmation() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;

    let mut unpaid = completed_session_event("cs_test_1", "pi_async_1", 20_000, &session.metadata);
    unpaid["data"]["object"]["payment_status"] = json!("unpaid");
    let ack = response_json(app.deliver(&unpaid).await).await;
    assert_eq!(ack["outcome"], "ignored");
    assert_eq!(app.order_count().await, 0);

    let mut succeeded = completed_session_event("cs_test_1", "pi_async_1", 20_000, &session.metadata);
    succeeded["id"] = json!("evt_async_ok");
    succeeded["type"] = json!("checkout.session.async_payment_succeeded");
    let ack = response_json(app.deliver(&succeeded).await).await;
    assert_eq!(ack["outcome"], "settled");
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn settlement_failure_after_capture_is_acknowledged_and_reported() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;

    // Stock disappears between opening the session and the callback
    app.state
        .services
        .inventory
        .reserve(SWEATER, 5)
        .await
        .expect("drain stock");

    let response = app
        .deliver(&completed_session_event(
            "cs_test_1",
            "pi_no_stock",
            20_000,
            &session.metadata,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = response_json(response).await;
    assert_eq!(ack["outcome"], "failed");
    assert_eq!(ack["code"], "insufficient_stock");

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.card_balance("GIFT-BETA-0002").await, 10_000);

    let events = app.drain_events().await;
    assert!(events.iter().any(|event| matches!(
        event,
        Event::SettlementFailed { payment_reference, code, .. }
            if payment_reference == "pi_no_stock" && code == "insufficient_stock"
    )));
}

#[tokio::test]
async fn database_failure_asks_for_redelivery() {
    let app = TestApp::with_catalog().await;
    let session = open_partial_session(&app).await;
    let event = completed_session_event("cs_test_1", "pi_db_down", 20_000, &session.metadata);

    app.db
        .execute_unprepared("ALTER TABLE order_items RENAME TO order_items_offline")
        .await
        .expect("take order_items offline");

    let response = app.deliver(&event).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response_json(response).await["code"], "database_error");

    // Rolled back: nothing to reconcile
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock(SWEATER).await, 5);
    assert_eq!(app.card_balance("GIFT-BETA-0002").await, 10_000);
    assert!(!app
        .drain_events()
        .await
        .iter()
        .any(|event| matches!(event, Event::SettlementFailed { .. })));

    app.db
        .execute_unprepared("ALTER TABLE order_items_offline RENAME TO order_items")
        .await
        .expect("restore order_items");

    let ack = response_json(app.deliver(&event).await).await;
    assert_eq!(ack["outcome"], "settled");
    assert_eq!(app.stock(SWEATER).await, 4);
    assert_eq!(app.card_balance("GIFT-BETA-0002").await, 0);
}

#[tokio::test]
async fn tampered_metadata_is_a_terminal_failure() {
    let app = TestApp::with_catalog().await;
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("cart".to_string(), "not json".to_string());

    let ack = response_json(
        app.deliver(&completed_session_event("cs_bad", "pi_bad_meta", 20_000, &metadata))
            .await,
    )
    .await;
    assert_eq!(ack["outcome"], "failed");
    assert_eq!(ack["code"], "invalid_metadata");
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unparseable_signed_body_is_acknowledged() {
    let app = TestApp::with_catalog().await;
    let payload = b"{\"not\":\"an event\"}".to_vec();
    let signature = app.verifier.sign(&payload, Utc::now().timestamp()).unwrap();

    let response = app.post_webhook(payload, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["outcome"], "failed");
}
