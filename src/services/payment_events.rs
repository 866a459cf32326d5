use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{parse_event, CompletedSession, PaymentEvent, SessionMetadata, WebhookVerifier};
use crate::services::fulfillment::{
    FulfillmentRequest, FulfillmentResult, OrderFulfillment, PaymentOutcome,
};

/// What happened to an authenticated event. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Settled { order_id: Uuid },
    /// Redelivery of an event whose order already exists
    Duplicate { order_id: Uuid },
    /// Recognised or unknown event that does not drive settlement
    Ignored { event_type: String },
    /// Terminal failure; logged and published for manual reconciliation
    Failed { code: String },
}

/// Idempotent handler for payment processor callbacks, keyed by payment reference.
#[derive(Clone)]
pub struct PaymentEventProcessor {
    verifier: WebhookVerifier,
    fulfillment: OrderFulfillment,
    events: EventSender,
}

impl PaymentEventProcessor {
    pub fn new(verifier: WebhookVerifier, fulfillment: OrderFulfillment, events: EventSender) -> Self {
        Self {
            verifier,
            fulfillment,
            events,
        }
    }

    /// Authenticates and processes one delivery.
    ///
    /// A signature failure is returned as an error, and so is a retryable
    /// database failure so the processor redelivers later. Everything else is
    /// acknowledged so the processor stops retrying.
    #[instrument(skip_all, fields(bytes = payload.len()))]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        if let Err(err) = self.verifier.verify(signature, payload, Utc::now().timestamp()) {
            counter!("storefront.webhook.rejected", 1);
            warn!(error = %err, "Rejected unauthenticated payment event");
            return Err(err);
        }

        let event = match parse_event(payload) {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "Authenticated payment event could not be parsed");
                counter!("storefront.settlement.failed", 1, "reason" => err.code());
                return Ok(WebhookOutcome::Failed {
                    code: err.code().to_string(),
                });
            }
        };

        match event {
            PaymentEvent::SessionCompleted(session) if session.paid => self.settle(session).await,
            PaymentEvent::AsyncPaymentSucceeded(session) => self.settle(session).await,
            PaymentEvent::SessionCompleted(session) => {
                info!(
                    session_id = %session.session_id,
                    "Session completed without payment; waiting for async confirmation"
                );
                Ok(WebhookOutcome::Ignored {
                    event_type: crate::payments::events::SESSION_COMPLETED.to_string(),
                })
            }
            PaymentEvent::Failed {
                event_id,
                event_type,
                reference,
            } => {
                info!(%event_id, %event_type, ?reference, "Payment failed at processor");
                Ok(WebhookOutcome::Ignored { event_type })
            }
            PaymentEvent::SessionExpired {
                event_id,
                session_id,
            } => {
                info!(%event_id, %session_id, "Payment session expired");
                Ok(WebhookOutcome::Ignored {
                    event_type: crate::payments::events::SESSION_EXPIRED.to_string(),
                })
            }
            PaymentEvent::Unhandled {
                event_id,
                event_type,
            } => {
                debug!(%event_id, %event_type, "Ignoring unhandled payment event");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }

    #[instrument(skip_all, fields(payment_reference = %session.payment_reference, event_id = %session.event_id))]
    async fn settle(&self, session: CompletedSession) -> Result<WebhookOutcome, ServiceError> {
        let reference = session.payment_reference.clone();

        // Fast path for redeliveries; the unique index still decides races.
        match self.fulfillment.find_by_payment_reference(&reference).await {
            Ok(Some(existing)) => {
                counter!("storefront.settlement.duplicate", 1);
                info!(order_id = %existing.id, "Duplicate delivery acknowledged");
                return Ok(WebhookOutcome::Duplicate {
                    order_id: existing.id,
                });
            }
            Ok(None) => {}
            Err(err) if err.is_retryable() => return Err(retry_later(&reference, err)),
            Err(err) => return Ok(self.terminal(&reference, err).await),
        }

        let metadata = match SessionMetadata::decode(&session.metadata) {
            Ok(metadata) => metadata,
            Err(err) => {
                counter!("storefront.settlement.failed", 1, "reason" => err.code());
                return Ok(self.terminal(&reference, err).await);
            }
        };

        let customer_details = Some(session.customer_details)
            .filter(|v| !v.is_null())
            .or(metadata.customer)
            .unwrap_or_else(|| Value::Object(Default::default()));
        let shipping_details = session.shipping_details.or(metadata.shipping);

        let request = FulfillmentRequest {
            lines: metadata.lines,
            customer_id: metadata.customer_id,
            gift_card_code: metadata.gift_card_code,
            discount: metadata.discount,
            outcome: PaymentOutcome::Processor {
                payment_reference: reference.clone(),
                captured_amount: session.captured_amount,
            },
            customer_details,
            shipping_details,
        };

        match self.fulfillment.fulfill(request).await {
            Ok(FulfillmentResult::Settled(settled)) => Ok(WebhookOutcome::Settled {
                order_id: settled.order.id,
            }),
            Ok(FulfillmentResult::AlreadySettled { order_id }) => {
                Ok(WebhookOutcome::Duplicate { order_id })
            }
            Err(err) if err.is_retryable() => Err(retry_later(&reference, err)),
            Err(err) => Ok(self.terminal(&reference, err).await),
        }
    }

    /// Payment was captured but no order can be recorded.
    async fn terminal(&self, payment_reference: &str, err: ServiceError) -> WebhookOutcome {
        let code = err.code().to_string();
        error!(
            %payment_reference,
            %code,
            error = %err,
            "Settlement failed for captured payment; manual reconciliation required"
        );
        self.events
            .publish(Event::SettlementFailed {
                payment_reference: payment_reference.to_string(),
                code: code.clone(),
                reason: err.to_string(),
            })
            .await;
        WebhookOutcome::Failed { code }
    }
}

/// Nothing was committed; the redelivery goes through the idempotency guard.
fn retry_later(payment_reference: &str, err: ServiceError) -> ServiceError {
    counter!("storefront.webhook.retry_requested", 1);
    warn!(
        %payment_reference,
        error = %err,
        "Settlement hit a retryable database error; asking the processor to redeliver"
    );
    err
}
