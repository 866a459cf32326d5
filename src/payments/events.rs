use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::ServiceError;

pub const SESSION_COMPLETED: &str = "checkout.session.completed";
pub const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";
pub const SESSION_EXPIRED: &str = "checkout.session.expired";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    customer_details: Option<Value>,
    #[serde(default)]
    shipping_details: Option<Value>,
    #[serde(default)]
    collected_information: Option<CollectedInformation>,
}

#[derive(Debug, Deserialize)]
struct CollectedInformation {
    #[serde(default)]
    shipping_details: Option<Value>,
}

/// A checkout session the processor reports as finished.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub event_id: String,
    pub session_id: String,
    /// Payment intent id when present, otherwise the session id. Idempotency key.
    pub payment_reference: String,
    pub captured_amount: i64,
    pub currency: Option<String>,
    pub paid: bool,
    pub customer_details: Value,
    pub shipping_details: Option<Value>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    /// `checkout.session.completed`; settles only when `paid`
    SessionCompleted(CompletedSession),
    /// Delayed payment methods confirming after the session completed
    AsyncPaymentSucceeded(CompletedSession),
    /// Recognised but informational
    Failed { event_id: String, event_type: String, reference: Option<String> },
    SessionExpired { event_id: String, session_id: String },
    /// Anything else; acknowledged and ignored
    Unhandled { event_id: String, event_type: String },
}

fn completed_session(event_id: String, object: Value) -> Result<CompletedSession, ServiceError> {
    let session: SessionObject = serde_json::from_value(object)?;
    let captured_amount = session.amount_total.ok_or_else(|| {
        ServiceError::InvalidMetadata("completed session without amount_total".to_string())
    })?;
    let shipping_details = session
        .shipping_details
        .filter(|v| !v.is_null())
        .or_else(|| {
            session
                .collected_information
                .and_then(|info| info.shipping_details)
                .filter(|v| !v.is_null())
        });

    Ok(CompletedSession {
        event_id,
        payment_reference: session
            .payment_intent
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| session.id.clone()),
        session_id: session.id,
        captured_amount,
        currency: session.currency,
        paid: session.payment_status.as_deref() == Some("paid"),
        customer_details: session.customer_details.unwrap_or(Value::Null),
        shipping_details,
        metadata: session.metadata,
    })
}

/// Parses an already-authenticated event body.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, ServiceError> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    let Envelope {
        id,
        event_type,
        data,
    } = envelope;

    let event = match event_type.as_str() {
        SESSION_COMPLETED => PaymentEvent::SessionCompleted(completed_session(id, data.object)?),
        ASYNC_PAYMENT_SUCCEEDED => {
            PaymentEvent::AsyncPaymentSucceeded(completed_session(id, data.object)?)
        }
        SESSION_EXPIRED => PaymentEvent::SessionExpired {
            session_id: data
                .object
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            event_id: id,
        },
        ASYNC_PAYMENT_FAILED | PAYMENT_INTENT_FAILED => PaymentEvent::Failed {
            reference: data
                .object
                .get("payment_intent")
                .and_then(Value::as_str)
                .or_else(|| data.object.get("id").and_then(Value::as_str))
                .map(str::to_string),
            event_id: id,
            event_type,
        },
        _ => PaymentEvent::Unhandled {
            event_id: id,
            event_type,
        },
    };
    Ok(event)
}
