use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{PaymentProcessor, PaymentSession, SessionRequest};
use crate::errors::ServiceError;

#[derive(Debug, Deserialize)]
struct CouponResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Form-encoded REST client for a Stripe-compatible checkout API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: &str,
    ) -> Result<T, ServiceError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|env| env.error.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            warn!(%status, path, %message, "Payment processor rejected request");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ServiceError::PaymentProvider(format!("authentication failed: {}", message))
                }
                _ => ServiceError::PaymentProvider(message),
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::PaymentProvider(format!("unreadable response: {}", e)))
    }

    /// Creates a single-use coupon worth `amount_off` minor units.
    async fn create_coupon(
        &self,
        amount_off: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<String, ServiceError> {
        let form = vec![
            ("amount_off".to_string(), amount_off.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("duration".to_string(), "once".to_string()),
            ("max_redemptions".to_string(), "1".to_string()),
            ("name".to_string(), "Gift card".to_string()),
        ];
        let coupon: CouponResponse = self
            .post_form("/v1/coupons", &form, &format!("{}-coupon", idempotency_key))
            .await?;
        debug!(coupon_id = %coupon.id, "Created one-time discount coupon");
        Ok(coupon.id)
    }
}

/// Flattens a session request into the processor's bracketed form encoding.
fn session_form(request: &SessionRequest, coupon: Option<&str>) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            request.currency.clone(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    if let Some(coupon) = coupon {
        form.push(("discounts[0][coupon]".to_string(), coupon.to_string()));
    }
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }

    let mut keys: Vec<_> = request.metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), request.metadata[key].clone()));
    }
    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip_all, fields(items = request.line_items.len(), amount_due = request.amount_due()))]
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let coupon = match request.discount.filter(|d| *d > 0) {
            Some(amount) => Some(
                self.create_coupon(amount, &request.currency, &request.idempotency_key)
                    .await?,
            ),
            None => None,
        };

        let form = session_form(request, coupon.as_deref());
        let session: SessionResponse = self
            .post_form("/v1/checkout/sessions", &form, &request.idempotency_key)
            .await?;

        let redirect_url = session.url.ok_or_else(|| {
            ServiceError::PaymentProvider("session created without a redirect url".to_string())
        })?;

        debug!(session_id = %session.id, "Payment session opened");
        Ok(PaymentSession {
            id: session.id,
            redirect_url,
        })
    }
}
