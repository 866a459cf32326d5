//! Payment processor boundary: outbound session creation and inbound event
//! authentication/parsing.

pub mod client;
pub mod events;
pub mod metadata;
pub mod signature;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::ServiceError;

pub use client::StripeClient;
pub use events::{parse_event, CompletedSession, PaymentEvent};
pub use metadata::SessionMetadata;
pub use signature::WebhookVerifier;

/// One processor line item, priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    /// One-time amount off, equal to the gift card discount
    pub discount: Option<i64>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Sent as `Idempotency-Key` so a retried request opens one session
    pub idempotency_key: String,
}

impl SessionRequest {
    /// Amount the processor will charge.
    pub fn amount_due(&self) -> i64 {
        let gross: i64 = self
            .line_items
            .iter()
            .map(|item| item.unit_amount * i64::from(item.quantity))
            .sum();
        (gross - self.discount.unwrap_or(0)).max(0)
    }
}

/// An opened payment session; the shopper is sent to `redirect_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSession {
    pub id: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_session(&self, request: &SessionRequest)
        -> Result<PaymentSession, ServiceError>;
}
