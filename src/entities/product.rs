use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product as the checkout sees it: identity, current price and whether it is on sale.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub name: String,
    /// Unit price in minor currency units
    pub price: i64,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_variant::Entity")]
    InventoryVariant,
}

impl Related<super::inventory_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryVariant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
