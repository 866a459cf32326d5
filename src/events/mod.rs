use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::notifications::{Notifier, OrderConfirmation};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends and logs a failure instead of returning it; publishing never
    /// affects the outcome of the operation that triggered it.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// How a settled order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPath {
    /// Fully covered by a gift card; no processor involved
    GiftCard,
    /// Captured by the payment processor
    Processor,
    /// Cart priced to zero with no gift card applied
    NoCharge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A payment session was opened; the order does not exist yet.
    CheckoutSessionOpened {
        session_id: String,
        amount: i64,
        discount: i64,
    },
    /// An order and all its side effects committed.
    OrderSettled {
        order_id: Uuid,
        path: SettlementPath,
        customer_id: Option<Uuid>,
        payment_reference: String,
        amount: i64,
        discount: i64,
        currency: String,
        customer_details: serde_json::Value,
        settled_at: DateTime<Utc>,
    },
    /// A captured payment could not be turned into an order and needs manual reconciliation.
    SettlementFailed {
        payment_reference: String,
        code: String,
        reason: String,
    },
    /// A back-office edit changed a gift card.
    GiftCardAdjusted {
        code: String,
        balance: i64,
        is_enabled: bool,
    },
}

/// Drains the event channel until every sender is dropped.
///
/// Notifications run in detached tasks so a slow endpoint never stalls the loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderSettled {
                order_id,
                path,
                customer_id,
                payment_reference,
                amount,
                discount,
                currency,
                customer_details,
                settled_at,
            } => {
                info!(%order_id, ?path, %payment_reference, amount, "Order settled");
                let confirmation = OrderConfirmation {
                    order_id,
                    customer_id,
                    payment_reference,
                    amount,
                    discount,
                    currency,
                    customer_details,
                    settled_at,
                };
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move {
                    if let Err(e) = notifier.order_confirmed(&confirmation).await {
                        warn!(order_id = %confirmation.order_id, error = %e, "Order confirmation failed");
                    }
                });
            }
            Event::SettlementFailed {
                payment_reference,
                code,
                reason,
            } => {
                error!(
                    %payment_reference,
                    %code,
                    %reason,
                    "Settlement failed after payment capture; reconcile manually"
                );
            }
            Event::CheckoutSessionOpened {
                session_id,
                amount,
                discount,
            } => {
                info!(%session_id, amount, discount, "Checkout session opened");
            }
            Event::GiftCardAdjusted {
                code,
                balance,
                is_enabled,
            } => {
                info!(code = %crate::services::gift_cards::mask_code(&code), balance, is_enabled, "Gift card adjusted");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ChannelNotifier(mpsc::UnboundedSender<Uuid>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn order_confirmed(
            &self,
            confirmation: &OrderConfirmation,
        ) -> Result<(), NotificationError> {
            let _ = self.0.send(confirmation.order_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn settled_orders_reach_the_notifier() {
        let (tx, rx) = mpsc::channel(8);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(process_events(rx, Arc::new(ChannelNotifier(seen_tx))));

        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderSettled {
                order_id,
                path: SettlementPath::GiftCard,
                customer_id: None,
                payment_reference: "giftcard_x".into(),
                amount: 0,
                discount: 30_000,
                currency: "nok".into(),
                customer_details: serde_json::json!({}),
                settled_at: Utc::now(),
            })
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(order_id));

        drop(sender);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn publish_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx)
            .publish(Event::SettlementFailed {
                payment_reference: "pi_1".into(),
                code: "insufficient_stock".into(),
                reason: "gone".into(),
            })
            .await;
    }
}
