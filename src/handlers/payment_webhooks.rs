use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::Serialize;

use crate::errors::ServiceError;
use crate::payments::signature::SIGNATURE_HEADER;
use crate::services::payment_events::WebhookOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

/// POST /api/v1/payments/webhook
///
/// Takes the raw body so the signature is checked over the exact bytes sent.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .services
        .payment_events
        .handle(signature, &body)
        .await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
