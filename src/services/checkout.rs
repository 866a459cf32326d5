use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{PaymentProcessor, SessionLineItem, SessionMetadata, SessionRequest};
use crate::services::catalog::{reprice, Catalog, PricedLine};
use crate::services::fulfillment::{
    FulfillmentRequest, OrderFulfillment, PaymentOutcome,
};
use crate::services::gift_cards::{normalize_code, GiftCardLedger};
use crate::services::inventory::InventoryLedger;
use crate::services::pricing::{price, CartLine, PriceBreakdown};

/// A cart submitted for checkout. Line prices are provisional.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub customer_id: Option<Uuid>,
    pub gift_card_code: Option<String>,
    pub customer_details: Value,
    pub shipping_details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Nothing left to charge (gift card or zero-priced cart); already settled.
    Completed {
        order_id: Uuid,
        #[serde(flatten)]
        breakdown: PriceBreakdown,
    },
    /// Shopper must pay at the processor; settlement happens on the callback.
    Redirect {
        session_id: String,
        redirect_url: String,
        #[serde(flatten)]
        breakdown: PriceBreakdown,
    },
}

/// Where the processor sends the shopper afterwards, and the order currency.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Turns a cart into either a settled free order or an open payment session.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn Catalog>,
    gift_cards: GiftCardLedger,
    inventory: InventoryLedger,
    fulfillment: OrderFulfillment,
    processor: Arc<dyn PaymentProcessor>,
    events: EventSender,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        gift_cards: GiftCardLedger,
        inventory: InventoryLedger,
        fulfillment: OrderFulfillment,
        processor: Arc<dyn PaymentProcessor>,
        events: EventSender,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            gift_cards,
            inventory,
            fulfillment,
            processor,
            events,
            settings,
        }
    }

    #[instrument(skip_all, fields(lines = request.lines.len(), guest = request.customer_id.is_none()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, ServiceError> {
        let priced = reprice(self.catalog.as_ref(), &request.lines).await?;
        let lines: Vec<CartLine> = priced.iter().map(|p| p.line).collect();

        let gift_card_code = request
            .gift_card_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(normalize_code)
            .transpose()?;

        let card = match &gift_card_code {
            Some(code) => Some(self.gift_cards.validate(code).await?),
            None => None,
        };

        let breakdown = price(&lines, card.as_ref())?;

        if breakdown.is_fully_covered() {
            let result = self
                .fulfillment
                .fulfill(FulfillmentRequest {
                    lines,
                    customer_id: request.customer_id,
                    gift_card_code,
                    discount: breakdown.discount,
                    outcome: PaymentOutcome::GiftCard,
                    customer_details: request.customer_details,
                    shipping_details: request.shipping_details,
                })
                .await?;

            // Synthetic references are fresh, so this is always a new order.
            let order_id = result.order_id();
            info!(
                %order_id,
                subtotal = breakdown.subtotal,
                discount = breakdown.discount,
                "Checkout settled without a payment session"
            );
            return Ok(CheckoutOutcome::Completed {
                order_id,
                breakdown,
            });
        }

        self.ensure_in_stock(&lines).await?;

        let session_request = self.session_request(&request, &priced, gift_card_code, &breakdown)?;
        let session = self.processor.create_session(&session_request).await?;

        info!(
            session_id = %session.id,
            total = breakdown.total,
            discount = breakdown.discount,
            "Payment session opened"
        );
        self.events
            .publish(Event::CheckoutSessionOpened {
                session_id: session.id.clone(),
                amount: breakdown.total,
                discount: breakdown.discount,
            })
            .await;

        Ok(CheckoutOutcome::Redirect {
            session_id: session.id,
            redirect_url: session.redirect_url,
            breakdown,
        })
    }

    /// Advisory stock check so obvious shortages surface before payment.
    /// Settlement still reserves atomically.
    async fn ensure_in_stock(&self, lines: &[CartLine]) -> Result<(), ServiceError> {
        for line in lines {
            match self.inventory.available(line.variant).await? {
                None => return Err(ServiceError::VariantNotSellable(line.variant)),
                Some(stock) if stock < line.quantity => {
                    return Err(ServiceError::InsufficientStock(line.variant))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn session_request(
        &self,
        request: &CheckoutRequest,
        priced: &[PricedLine],
        gift_card_code: Option<String>,
        breakdown: &PriceBreakdown,
    ) -> Result<SessionRequest, ServiceError> {
        let discount = (breakdown.discount > 0).then_some(breakdown.discount);

        let metadata = SessionMetadata {
            lines: priced.iter().map(|p| p.line).collect(),
            customer_id: request.customer_id,
            gift_card_code: discount.and(gift_card_code),
            discount: breakdown.discount,
            shipping: request.shipping_details.clone(),
            customer: Some(request.customer_details.clone()).filter(|v| !v.is_null()),
        }
        .encode()?;

        Ok(SessionRequest {
            line_items: priced
                .iter()
                .map(|p| SessionLineItem {
                    name: p.product_name.clone(),
                    unit_amount: p.line.unit_price,
                    quantity: p.line.quantity,
                })
                .collect(),
            discount,
            currency: self.settings.currency.clone(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            customer_email: request
                .customer_details
                .get("email")
                .and_then(Value::as_str)
                .map(str::to_string),
            metadata,
            idempotency_key: Uuid::new_v4().to_string(),
        })
    }
}
