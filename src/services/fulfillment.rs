use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus};
use crate::entities::order_item;
use crate::errors::{GiftCardRejection, ServiceError};
use crate::events::{Event, EventSender, SettlementPath};
use crate::services::gift_cards::{mask_code, normalize_code, GiftCardLedger};
use crate::services::inventory::InventoryLedger;
use crate::services::pricing::{price_with_balance, CartLine};

/// Prefix of synthetic payment references for gift-card-covered orders.
pub const GIFT_CARD_REFERENCE_PREFIX: &str = "giftcard_";
/// Prefix for orders that priced to zero without any gift card.
pub const NO_CHARGE_REFERENCE_PREFIX: &str = "nocharge_";

/// How the order was paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Nothing left to charge: covered by a gift card, or a zero-priced cart.
    /// A synthetic reference is generated.
    GiftCard,
    /// Paid via the processor; `captured_amount` is authoritative.
    Processor {
        payment_reference: String,
        captured_amount: i64,
    },
}

#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub lines: Vec<CartLine>,
    pub customer_id: Option<Uuid>,
    pub gift_card_code: Option<String>,
    pub discount: i64,
    pub outcome: PaymentOutcome,
    pub customer_details: Value,
    pub shipping_details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettledOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentResult {
    Settled(SettledOrder),
    /// An order with this payment reference already exists; nothing was written.
    AlreadySettled { order_id: Uuid },
}

impl FulfillmentResult {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Settled(settled) => settled.order.id,
            Self::AlreadySettled { order_id } => *order_id,
        }
    }
}

/// Lines in the order their stock rows are locked: ascending [`VariantKey`].
///
/// Every settlement takes row locks in the same global order, so two carts
/// holding the same variants in different positions cannot deadlock.
pub fn reservation_order(lines: &[CartLine]) -> Vec<&CartLine> {
    let mut ordered: Vec<&CartLine> = lines.iter().collect();
    ordered.sort_by_key(|line| line.variant);
    ordered
}

/// The all-or-nothing settlement unit shared by the free and paid paths.
#[derive(Clone)]
pub struct OrderFulfillment {
    db: Arc<DbPool>,
    events: EventSender,
    currency: String,
}

struct Prepared {
    payment_reference: String,
    amount: i64,
    gift_card_code: Option<String>,
    path: SettlementPath,
}

impl OrderFulfillment {
    pub fn new(db: Arc<DbPool>, events: EventSender, currency: impl Into<String>) -> Self {
        Self {
            db,
            events,
            currency: currency.into(),
        }
    }

    /// Rejects requests that could never balance before a transaction is opened.
    fn prepare(&self, request: &FulfillmentRequest) -> Result<Prepared, ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        if request.discount < 0 {
            return Err(ServiceError::ValidationError(
                "discount must not be negative".to_string(),
            ));
        }

        let gift_card_code = match (&request.gift_card_code, request.discount) {
            (_, 0) => None,
            (Some(code), _) => Some(normalize_code(code)?),
            (None, _) => {
                return Err(ServiceError::ValidationError(
                    "discount requires a gift card".to_string(),
                ))
            }
        };

        let breakdown = price_with_balance(&request.lines, Some(request.discount))?;
        if breakdown.discount != request.discount {
            return Err(ServiceError::ValidationError(format!(
                "discount {} exceeds subtotal {}",
                request.discount, breakdown.subtotal
            )));
        }

        match &request.outcome {
            PaymentOutcome::GiftCard => {
                if !breakdown.is_fully_covered() {
                    return Err(ServiceError::ValidationError(format!(
                        "gift card covers {} of {}",
                        breakdown.discount, breakdown.subtotal
                    )));
                }
                let (prefix, path) = match gift_card_code {
                    Some(_) => (GIFT_CARD_REFERENCE_PREFIX, SettlementPath::GiftCard),
                    None => (NO_CHARGE_REFERENCE_PREFIX, SettlementPath::NoCharge),
                };
                Ok(Prepared {
                    payment_reference: format!("{}{}", prefix, Uuid::new_v4().simple()),
                    amount: 0,
                    gift_card_code,
                    path,
                })
            }
            PaymentOutcome::Processor {
                payment_reference,
                captured_amount,
            } => {
                if payment_reference.trim().is_empty() {
                    return Err(ServiceError::ValidationError(
                        "missing payment reference".to_string(),
                    ));
                }
                if *captured_amount != breakdown.total {
                    warn!(
                        %payment_reference,
                        captured = captured_amount,
                        expected = breakdown.total,
                        "Captured amount differs from priced total; recording captured amount"
                    );
                }
                Ok(Prepared {
                    payment_reference: payment_reference.clone(),
                    amount: *captured_amount,
                    gift_card_code,
                    path: SettlementPath::Processor,
                })
            }
        }
    }

    /// Runs the settlement transaction.
    ///
    /// Inside one transaction: re-validate the gift card, claim the payment
    /// reference by inserting the order, reserve every line, snapshot the
    /// items, debit the card. Any failure rolls all of it back.
    #[instrument(skip_all, fields(lines = request.lines.len(), discount = request.discount))]
    pub async fn fulfill(
        &self,
        request: FulfillmentRequest,
    ) -> Result<FulfillmentResult, ServiceError> {
        let prepared = self.prepare(&request)?;
        let payment_reference = prepared.payment_reference.clone();

        let txn = self.db.begin().await?;
        match self.apply(&txn, &request, &prepared).await {
            Ok(settled) => {
                txn.commit().await?;
                counter!("storefront.settlement.completed", 1);
                info!(
                    order_id = %settled.order.id,
                    %payment_reference,
                    amount = settled.order.amount,
                    "Order settled"
                );
                self.events
                    .publish(Event::OrderSettled {
                        order_id: settled.order.id,
                        path: prepared.path,
                        customer_id: settled.order.customer_id,
                        payment_reference,
                        amount: settled.order.amount,
                        discount: settled.order.discount_amount,
                        currency: settled.order.currency.clone(),
                        customer_details: settled.order.customer_details.clone(),
                        settled_at: settled.order.created_at,
                    })
                    .await;
                Ok(FulfillmentResult::Settled(settled))
            }
            Err(err) if err.is_unique_violation() => {
                txn.rollback().await?;
                let existing = self
                    .find_by_payment_reference(&payment_reference)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "unique violation without a matching order".to_string(),
                        )
                    })?;
                counter!("storefront.settlement.duplicate", 1);
                info!(order_id = %existing.id, %payment_reference, "Payment reference already settled");
                Ok(FulfillmentResult::AlreadySettled {
                    order_id: existing.id,
                })
            }
            Err(err) => {
                txn.rollback().await?;
                counter!("storefront.settlement.failed", 1, "reason" => err.code());
                warn!(%payment_reference, code = err.code(), error = %err, "Settlement rolled back");
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        request: &FulfillmentRequest,
        prepared: &Prepared,
    ) -> Result<SettledOrder, ServiceError> {
        let now = Utc::now();

        if let Some(code) = &prepared.gift_card_code {
            let card = GiftCardLedger::validate_on(txn, code, now).await?;
            if card.balance < request.discount {
                warn!(
                    code = %mask_code(code),
                    balance = card.balance,
                    discount = request.discount,
                    "Gift card balance no longer covers the discount"
                );
                return Err(ServiceError::GiftCard(GiftCardRejection::Exhausted));
            }
        }

        let order = order::Model {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            amount: prepared.amount,
            currency: self.currency.clone(),
            status: OrderStatus::Completed,
            payment_reference: prepared.payment_reference.clone(),
            customer_details: request.customer_details.clone(),
            shipping_details: request.shipping_details.clone(),
            discount_amount: request.discount,
            gift_card_code: prepared.gift_card_code.clone(),
            created_at: now,
        };
        order::Entity::insert(order::ActiveModel {
            id: Set(order.id),
            customer_id: Set(order.customer_id),
            amount: Set(order.amount),
            currency: Set(order.currency.clone()),
            status: Set(order.status),
            payment_reference: Set(order.payment_reference.clone()),
            customer_details: Set(order.customer_details.clone()),
            shipping_details: Set(order.shipping_details.clone()),
            discount_amount: Set(order.discount_amount),
            gift_card_code: Set(order.gift_card_code.clone()),
            created_at: Set(order.created_at),
        })
        .exec_without_returning(txn)
        .await?;

        for line in reservation_order(&request.lines) {
            InventoryLedger::reserve_on(txn, line.variant, line.quantity).await?;
        }

        let items: Vec<order_item::Model> = request
            .lines
            .iter()
            .map(|line| order_item::Model {
                id: Uuid::new_v4(),
                order_id: order.id,
                product_id: line.variant.product_id,
                size_id: line.variant.size_id,
                color_id: line.variant.color_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();
        order_item::Entity::insert_many(items.iter().map(|item| order_item::ActiveModel {
            id: Set(item.id),
            order_id: Set(item.order_id),
            product_id: Set(item.product_id),
            size_id: Set(item.size_id),
            color_id: Set(item.color_id),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
        }))
        .exec_without_returning(txn)
        .await?;

        if let Some(code) = &prepared.gift_card_code {
            GiftCardLedger::debit_on(txn, code, request.discount, now).await?;
        }

        Ok(SettledOrder { order, items })
    }

    pub async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::PaymentReference.eq(payment_reference))
            .one(&*self.db)
            .await?)
    }

    /// Order with its item snapshot, for confirmation pages.
    pub async fn find_order(&self, order_id: Uuid) -> Result<SettledOrder, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::ProductId)
            .order_by_asc(order_item::Column::SizeId)
            .order_by_asc(order_item::Column::ColorId)
            .all(&*self.db)
            .await?;
        Ok(SettledOrder { order, items })
    }
}
