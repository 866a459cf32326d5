use axum::{extract::State, response::Response, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, success_response, validate_input};
use crate::entities::inventory_variant::VariantKey;
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutOutcome, CheckoutRequest};
use crate::services::pricing::{CartLine, PriceBreakdown};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutItem {
    pub product_id: i32,
    pub size_id: i32,
    pub color_id: i32,
    pub quantity: i32,
    /// Client-declared price; replaced by the catalog price
    #[validate(range(min = 0))]
    pub unit_price: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutBody {
    #[validate]
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    pub customer_id: Option<Uuid>,
    #[validate(length(max = 64))]
    pub gift_card_code: Option<String>,
    #[serde(default)]
    pub customer: Value,
    pub shipping: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Totals {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub included_tax: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    Completed {
        order_id: Uuid,
        totals: Totals,
    },
    Redirect {
        session_id: String,
        redirect_url: String,
        totals: Totals,
    },
}

fn totals(breakdown: &PriceBreakdown, state: &AppState) -> Totals {
    Totals {
        subtotal: breakdown.subtotal,
        discount: breakdown.discount,
        total: breakdown.total,
        included_tax: breakdown.included_tax(state.config.display_tax_rate),
    }
}

/// POST /api/v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Response, ServiceError> {
    validate_input(&body)?;

    let request = CheckoutRequest {
        lines: body
            .items
            .iter()
            .map(|item| {
                CartLine::new(
                    VariantKey::new(item.product_id, item.size_id, item.color_id),
                    item.quantity,
                    item.unit_price,
                )
            })
            .collect(),
        customer_id: body.customer_id,
        gift_card_code: body.gift_card_code,
        customer_details: if body.customer.is_null() {
            Value::Object(Default::default())
        } else {
            body.customer
        },
        shipping_details: body.shipping,
    };

    let response = match state.services.checkout.checkout(request).await? {
        CheckoutOutcome::Completed {
            order_id,
            breakdown,
        } => created_response(CheckoutResponse::Completed {
            order_id,
            totals: totals(&breakdown, &state),
        }),
        CheckoutOutcome::Redirect {
            session_id,
            redirect_url,
            breakdown,
        } => success_response(CheckoutResponse::Redirect {
            session_id,
            redirect_url,
            totals: totals(&breakdown, &state),
        }),
    };
    Ok(response)
}
