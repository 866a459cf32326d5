pub mod admin;
pub mod checkout;
pub mod common;
pub mod gift_cards;
pub mod inventory;
pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::{PaymentProcessor, WebhookVerifier};
use crate::services::{
    catalog::DbCatalog,
    checkout::{CheckoutService, CheckoutSettings},
    fulfillment::OrderFulfillment,
    gift_cards::GiftCardLedger,
    inventory::InventoryLedger,
    payment_events::PaymentEventProcessor,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub payment_events: Arc<PaymentEventProcessor>,
    pub fulfillment: Arc<OrderFulfillment>,
    pub gift_cards: Arc<GiftCardLedger>,
    pub inventory: Arc<InventoryLedger>,
}

impl AppServices {
    /// Wires every service against one pool, one event channel and one processor.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let gift_cards = GiftCardLedger::new(db_pool.clone());
        let inventory = InventoryLedger::new(db_pool.clone());
        let fulfillment =
            OrderFulfillment::new(db_pool.clone(), event_sender.clone(), config.currency.clone());

        let checkout = CheckoutService::new(
            Arc::new(DbCatalog::new(db_pool)),
            gift_cards.clone(),
            inventory.clone(),
            fulfillment.clone(),
            processor,
            event_sender.clone(),
            CheckoutSettings {
                currency: config.currency.clone(),
                success_url: config.checkout_success_url.clone(),
                cancel_url: config.checkout_cancel_url.clone(),
            },
        );

        let verifier = WebhookVerifier::new(
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
        );
        let payment_events =
            PaymentEventProcessor::new(verifier, fulfillment.clone(), event_sender);

        Self {
            checkout: Arc::new(checkout),
            payment_events: Arc::new(payment_events),
            fulfillment: Arc::new(fulfillment),
            gift_cards: Arc::new(gift_cards),
            inventory: Arc::new(inventory),
        }
    }
}
