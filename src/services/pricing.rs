//! Money & cart pricing.
//!
//! Everything here is pure arithmetic over minor currency units. The same
//! [`price`] call feeds both the free-order shortcut and the amount quoted to
//! the payment processor, so the two can never disagree.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::entities::gift_card;
use crate::entities::inventory_variant::VariantKey;
use crate::errors::ServiceError;

/// One priced cart line. `unit_price` is in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant: VariantKey,
    pub quantity: i32,
    pub unit_price: i64,
}

impl CartLine {
    pub fn new(variant: VariantKey, quantity: i32, unit_price: i64) -> Self {
        Self {
            variant,
            quantity,
            unit_price,
        }
    }

    fn line_total(&self) -> Result<i64, ServiceError> {
        if self.quantity < 1 {
            return Err(ServiceError::InvalidQuantity {
                variant: self.variant,
                quantity: self.quantity,
            });
        }
        if self.unit_price < 0 {
            return Err(ServiceError::ValidationError(format!(
                "negative unit price for {}",
                self.variant
            )));
        }
        self.unit_price
            .checked_mul(i64::from(self.quantity))
            .ok_or_else(overflow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

impl PriceBreakdown {
    /// Fully covered by the gift card; no processor payment needed.
    pub fn is_fully_covered(&self) -> bool {
        self.total == 0
    }

    /// VAT already contained in `total`, rounded to minor units. Display only.
    pub fn included_tax(&self, rate: Decimal) -> i64 {
        if rate <= Decimal::ZERO {
            return 0;
        }
        let total = Decimal::from(self.total);
        (total * rate / (Decimal::ONE + rate))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0)
    }
}

fn overflow() -> ServiceError {
    ServiceError::ValidationError("cart total exceeds the supported range".to_string())
}

/// Prices a cart against an optional gift card.
///
/// `discount = min(balance, subtotal)` and `total = subtotal - discount`.
/// An empty slice prices to zero; rejecting empty carts is the caller's job.
pub fn price(
    lines: &[CartLine],
    gift_card: Option<&gift_card::Model>,
) -> Result<PriceBreakdown, ServiceError> {
    price_with_balance(lines, gift_card.map(|card| card.balance))
}

/// Same as [`price`] with the card reduced to its balance.
pub fn price_with_balance(
    lines: &[CartLine],
    gift_card_balance: Option<i64>,
) -> Result<PriceBreakdown, ServiceError> {
    let subtotal = lines.iter().try_fold(0i64, |acc, line| {
        acc.checked_add(line.line_total()?).ok_or_else(overflow)
    })?;

    let discount = gift_card_balance
        .map(|balance| balance.max(0).min(subtotal))
        .unwrap_or(0);
    let total = (subtotal - discount).max(0);

    Ok(PriceBreakdown {
        subtotal,
        discount,
        total,
    })
}
