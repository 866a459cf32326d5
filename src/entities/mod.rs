pub mod gift_card;
pub mod inventory_variant;
pub mod order;
pub mod order_item;
pub mod product;
