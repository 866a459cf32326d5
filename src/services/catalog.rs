use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::db::DbPool;
use crate::entities::inventory_variant::VariantKey;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::services::inventory::InventoryLedger;
use crate::services::pricing::CartLine;

/// What the catalog knows about a sellable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub variant: VariantKey,
    pub product_name: String,
    pub unit_price: i64,
}

/// Source of truth for prices and for which variants exist.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `None` when the product is unknown or inactive, or the variant has no stock row.
    async fn lookup(&self, variant: VariantKey) -> Result<Option<CatalogEntry>, ServiceError>;
}

/// Catalog backed by the `products` and `inventory_variants` tables.
#[derive(Clone)]
pub struct DbCatalog {
    db: Arc<DbPool>,
}

impl DbCatalog {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for DbCatalog {
    async fn lookup(&self, variant: VariantKey) -> Result<Option<CatalogEntry>, ServiceError> {
        let product = product::Entity::find_by_id(variant.product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;

        let Some(product) = product else {
            return Ok(None);
        };

        if InventoryLedger::find_on(&*self.db, variant).await?.is_none() {
            return Ok(None);
        }

        Ok(Some(CatalogEntry {
            variant,
            product_name: product.name,
            unit_price: product.price,
        }))
    }
}

/// A cart line carrying the catalog's price and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub line: CartLine,
    pub product_name: String,
}

/// Collapses repeated variants into one line, keeping first-seen order.
pub fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, ServiceError> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::InvalidQuantity {
                variant: line.variant,
                quantity: line.quantity,
            });
        }
        match merged.iter_mut().find(|m| m.variant == line.variant) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    ServiceError::InvalidQuantity {
                        variant: line.variant,
                        quantity: line.quantity,
                    },
                )?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

/// Replaces client-declared prices with catalog prices.
///
/// The client's `unit_price` is provisional: a mismatch is logged and the
/// catalog wins. Unknown variants fail the whole cart.
#[instrument(skip_all, fields(lines = lines.len()))]
pub async fn reprice(
    catalog: &dyn Catalog,
    lines: &[CartLine],
) -> Result<Vec<PricedLine>, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let merged = merge_lines(lines)?;
    let mut priced = Vec::with_capacity(merged.len());

    for line in merged {
        let entry = catalog
            .lookup(line.variant)
            .await?
            .ok_or(ServiceError::VariantNotSellable(line.variant))?;

        if entry.unit_price != line.unit_price {
            warn!(
                variant = %line.variant,
                declared = line.unit_price,
                catalog = entry.unit_price,
                "Client price differs from catalog; using catalog price"
            );
        }

        priced.push(PricedLine {
            line: CartLine::new(line.variant, line.quantity, entry.unit_price),
            product_name: entry.product_name,
        });
    }

    Ok(priced)
}
