use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub size_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub color_id: i32,
    pub quantity: i32,
}

impl Model {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.product_id, self.size_id, self.color_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A concrete purchasable (product, size, color) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub product_id: i32,
    pub size_id: i32,
    pub color_id: i32,
}

impl VariantKey {
    pub const fn new(product_id: i32, size_id: i32, color_id: i32) -> Self {
        Self {
            product_id,
            size_id,
            color_id,
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product {} size {} color {}",
            self.product_id, self.size_id, self.color_id
        )
    }
}
