pub mod catalog;
pub mod checkout;
pub mod fulfillment;
pub mod gift_cards;
pub mod inventory;
pub mod payment_events;
pub mod pricing;
