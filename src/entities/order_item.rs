use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::inventory_variant::VariantKey;

/// Immutable snapshot of one sold line.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: i32,
    pub size_id: i32,
    pub color_id: i32,
    pub quantity: i32,
    pub unit_price: i64,
}

impl Model {
    pub fn variant(&self) -> VariantKey {
        VariantKey::new(self.product_id, self.size_id, self.color_id)
    }

    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
