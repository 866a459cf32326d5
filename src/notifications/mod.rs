use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Payload handed to the confirmation channel after an order commits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub payment_reference: String,
    pub amount: i64,
    pub discount: i64,
    pub currency: String,
    pub customer_details: serde_json::Value,
    pub settled_at: DateTime<Utc>,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Notification endpoint rejected the payload with status {0}")]
    Rejected(u16),
}

/// Fire-and-forget order confirmation dispatch.
///
/// Implementations run after commit; an error is logged by the caller and
/// never reaches the order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmed(&self, confirmation: &OrderConfirmation)
        -> Result<(), NotificationError>;
}

/// Writes confirmations to the log; the default when no endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmed(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            amount = confirmation.amount,
            currency = %confirmation.currency,
            "Order confirmation ready"
        );
        Ok(())
    }
}

/// Posts confirmations as JSON to an external mailer/webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip_all, fields(order_id = %confirmation.order_id))]
    async fn order_confirmed(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let response = self.client.post(&self.url).json(confirmation).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        info!("Order confirmation delivered");
        Ok(())
    }
}
