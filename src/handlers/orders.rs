use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::fulfillment::SettledOrder;
use crate::AppState;

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<SettledOrder>, ServiceError> {
    let order = state.services.fulfillment.find_order(order_id).await?;
    Ok(Json(order))
}
