use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::common::validate_input;
use crate::entities::inventory_variant::VariantKey;
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StockView {
    #[serde(flatten)]
    pub variant: VariantKey,
    pub available: i32,
}

/// GET /api/v1/inventory/:product_id/:size_id/:color_id
pub async fn get_stock(
    State(state): State<AppState>,
    Path((product_id, size_id, color_id)): Path<(i32, i32, i32)>,
) -> Result<Json<StockView>, ServiceError> {
    let variant = VariantKey::new(product_id, size_id, color_id);
    let available = state
        .services
        .inventory
        .available(variant)
        .await?
        .ok_or(ServiceError::VariantNotSellable(variant))?;
    Ok(Json(StockView { variant, available }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RestockBody {
    pub product_id: i32,
    pub size_id: i32,
    pub color_id: i32,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// POST /api/v1/admin/inventory/restock
pub async fn restock(
    State(state): State<AppState>,
    Json(body): Json<RestockBody>,
) -> Result<Json<StockView>, ServiceError> {
    validate_input(&body)?;
    let variant = VariantKey::new(body.product_id, body.size_id, body.color_id);
    let available = state
        .services
        .inventory
        .restock(variant, body.quantity)
        .await?;
    Ok(Json(StockView { variant, available }))
}
