use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::gift_card;
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct GiftCardView {
    pub code: String,
    pub balance: i64,
    pub initial_amount: i64,
    pub is_enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<gift_card::Model> for GiftCardView {
    fn from(card: gift_card::Model) -> Self {
        Self {
            code: card.code,
            balance: card.balance,
            initial_amount: card.initial_amount,
            is_enabled: card.is_enabled,
            expires_at: card.expires_at,
        }
    }
}

/// GET /api/v1/gift-cards/:code
///
/// Pre-checkout check. Unusable cards come back as their specific rejection.
pub async fn get_gift_card(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GiftCardView>, ServiceError> {
    let card = state.services.gift_cards.validate(&code).await?;
    Ok(Json(card.into()))
}
