use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};

use super::common::{created_response, success_response};
use super::gift_cards::GiftCardView;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::gift_cards::{AdjustGiftCard, IssueGiftCard};
use crate::AppState;

/// POST /api/v1/admin/gift-cards
pub async fn issue_gift_card(
    State(state): State<AppState>,
    Json(body): Json<IssueGiftCard>,
) -> Result<Response, ServiceError> {
    let card = state.services.gift_cards.issue(body).await?;
    Ok(created_response(GiftCardView::from(card)))
}

/// PATCH /api/v1/admin/gift-cards/:code
pub async fn adjust_gift_card(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<AdjustGiftCard>,
) -> Result<Response, ServiceError> {
    let card = state.services.gift_cards.adjust(&code, body).await?;
    state
        .event_sender
        .publish(Event::GiftCardAdjusted {
            code: card.code.clone(),
            balance: card.balance,
            is_enabled: card.is_enabled,
        })
        .await;
    Ok(success_response(GiftCardView::from(card)))
}
