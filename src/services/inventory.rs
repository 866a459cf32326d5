use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::db::DbPool;
use crate::entities::inventory_variant::{self, VariantKey};
use crate::errors::ServiceError;

/// Per-variant stock counts.
///
/// Stock only moves through single conditional updates; there is no
/// read-check-write path anywhere in this type.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Arc<DbPool>,
}

impl InventoryLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Takes `quantity` units of `variant` or fails without touching anything.
    ///
    /// Zero affected rows covers both "not enough stock" and "no such
    /// variant"; either way the caller must abort the settlement.
    pub async fn reserve_on<C: ConnectionTrait>(
        conn: &C,
        variant: VariantKey,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::InvalidQuantity { variant, quantity });
        }

        let result = inventory_variant::Entity::update_many()
            .col_expr(
                inventory_variant::Column::Quantity,
                Expr::col(inventory_variant::Column::Quantity).sub(quantity),
            )
            .filter(inventory_variant::Column::ProductId.eq(variant.product_id))
            .filter(inventory_variant::Column::SizeId.eq(variant.size_id))
            .filter(inventory_variant::Column::ColorId.eq(variant.color_id))
            .filter(inventory_variant::Column::Quantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%variant, quantity, "Stock reservation matched no rows");
            return Err(ServiceError::InsufficientStock(variant));
        }

        debug!(%variant, quantity, "Stock reserved");
        Ok(())
    }

    #[instrument(skip(self), fields(variant = %variant))]
    pub async fn reserve(&self, variant: VariantKey, quantity: i32) -> Result<(), ServiceError> {
        Self::reserve_on(&*self.db, variant, quantity).await
    }

    /// Current stock for display. `None` means the variant is not sellable.
    pub async fn available(&self, variant: VariantKey) -> Result<Option<i32>, ServiceError> {
        Self::find_on(&*self.db, variant)
            .await
            .map(|row| row.map(|r| r.quantity))
    }

    pub async fn find_on<C: ConnectionTrait>(
        conn: &C,
        variant: VariantKey,
    ) -> Result<Option<inventory_variant::Model>, ServiceError> {
        Ok(inventory_variant::Entity::find_by_id((
            variant.product_id,
            variant.size_id,
            variant.color_id,
        ))
        .one(conn)
        .await?)
    }

    /// Adds stock, creating the variant row if it does not exist yet.
    #[instrument(skip(self), fields(variant = %variant))]
    pub async fn restock(&self, variant: VariantKey, quantity: i32) -> Result<i32, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::InvalidQuantity { variant, quantity });
        }

        let row = inventory_variant::ActiveModel {
            product_id: Set(variant.product_id),
            size_id: Set(variant.size_id),
            color_id: Set(variant.color_id),
            quantity: Set(quantity),
        };

        inventory_variant::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    inventory_variant::Column::ProductId,
                    inventory_variant::Column::SizeId,
                    inventory_variant::Column::ColorId,
                ])
                .value(
                    inventory_variant::Column::Quantity,
                    Expr::col((
                        inventory_variant::Entity,
                        inventory_variant::Column::Quantity,
                    ))
                    .add(quantity),
                )
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        let stock = self.available(variant).await?.unwrap_or(quantity);
        debug!(stock, "Variant restocked");
        Ok(stock)
    }
}
