use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::inventory_variant::VariantKey;
use crate::errors::ServiceError;
use crate::services::pricing::CartLine;

/// Processor-side limit on a single metadata value.
pub const MAX_VALUE_LEN: usize = 500;

const CART: &str = "cart";
const CUSTOMER_ID: &str = "customer_id";
const GIFT_CARD_CODE: &str = "gift_card_code";
const DISCOUNT: &str = "discount";
const SHIPPING: &str = "shipping";
const CUSTOMER: &str = "customer";

/// Everything settlement needs to rebuild an order from a completed session.
///
/// The cart travels as `[[product_id,size_id,color_id,quantity,unit_price],...]`
/// with server-side prices, so the callback never re-reads client input.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub lines: Vec<CartLine>,
    pub customer_id: Option<Uuid>,
    pub gift_card_code: Option<String>,
    pub discount: i64,
    pub shipping: Option<Value>,
    pub customer: Option<Value>,
}

fn too_large(key: &str) -> ServiceError {
    ServiceError::ValidationError(format!(
        "{} does not fit in payment session metadata",
        key
    ))
}

fn invalid(reason: impl Into<String>) -> ServiceError {
    ServiceError::InvalidMetadata(reason.into())
}

impl SessionMetadata {
    pub fn encode(&self) -> Result<HashMap<String, String>, ServiceError> {
        let condensed: Vec<[i64; 5]> = self
            .lines
            .iter()
            .map(|l| {
                [
                    i64::from(l.variant.product_id),
                    i64::from(l.variant.size_id),
                    i64::from(l.variant.color_id),
                    i64::from(l.quantity),
                    l.unit_price,
                ]
            })
            .collect();

        let mut out = HashMap::new();
        let cart = serde_json::to_string(&condensed)?;
        if cart.len() > MAX_VALUE_LEN {
            return Err(too_large(CART));
        }
        out.insert(CART.to_string(), cart);
        out.insert(DISCOUNT.to_string(), self.discount.to_string());

        if let Some(customer_id) = self.customer_id {
            out.insert(CUSTOMER_ID.to_string(), customer_id.to_string());
        }
        if let Some(code) = &self.gift_card_code {
            out.insert(GIFT_CARD_CODE.to_string(), code.clone());
        }
        for (key, value) in [(SHIPPING, &self.shipping), (CUSTOMER, &self.customer)] {
            if let Some(value) = value {
                let encoded = serde_json::to_string(value)?;
                if encoded.len() > MAX_VALUE_LEN {
                    return Err(too_large(key));
                }
                out.insert(key.to_string(), encoded);
            }
        }
        Ok(out)
    }

    pub fn decode(metadata: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let cart = metadata
            .get(CART)
            .ok_or_else(|| invalid("missing cart"))?;
        let condensed: Vec<Vec<i64>> =
            serde_json::from_str(cart).map_err(|e| invalid(format!("cart: {}", e)))?;
        if condensed.is_empty() {
            return Err(invalid("empty cart"));
        }

        let lines = condensed
            .iter()
            .map(|entry| decode_line(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let customer_id = metadata
            .get(CUSTOMER_ID)
            .filter(|s| !s.is_empty())
            .map(|s| Uuid::parse_str(s).map_err(|_| invalid("customer_id is not a UUID")))
            .transpose()?;

        let gift_card_code = metadata
            .get(GIFT_CARD_CODE)
            .filter(|s| !s.is_empty())
            .cloned();

        let discount = match metadata.get(DISCOUNT) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| invalid("discount is not an integer"))?,
            None => 0,
        };
        if discount < 0 {
            return Err(invalid("negative discount"));
        }
        if discount > 0 && gift_card_code.is_none() {
            return Err(invalid("discount without gift card"));
        }

        let shipping = decode_json(metadata, SHIPPING)?;
        let customer = decode_json(metadata, CUSTOMER)?;

        Ok(Self {
            lines,
            customer_id,
            gift_card_code,
            discount,
            shipping,
            customer,
        })
    }
}

fn decode_line(entry: &[i64]) -> Result<CartLine, ServiceError> {
    let [product_id, size_id, color_id, quantity, unit_price] = entry else {
        return Err(invalid("cart entries must have five fields"));
    };
    let narrow = |v: i64, field: &str| {
        i32::try_from(v).map_err(|_| invalid(format!("{} out of range", field)))
    };
    let variant = VariantKey::new(
        narrow(*product_id, "product_id")?,
        narrow(*size_id, "size_id")?,
        narrow(*color_id, "color_id")?,
    );
    let quantity = narrow(*quantity, "quantity")?;
    if quantity < 1 || *unit_price < 0 {
        return Err(invalid("non-positive quantity or negative price"));
    }
    Ok(CartLine::new(variant, quantity, *unit_price))
}

fn decode_json(
    metadata: &HashMap<String, String>,
    key: &str,
) -> Result<Option<Value>, ServiceError> {
    metadata
        .get(key)
        .map(|raw| serde_json::from_str(raw).map_err(|e| invalid(format!("{}: {}", key, e))))
        .transpose()
}
