use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::db::DbPool;
use crate::entities::gift_card;
use crate::errors::{GiftCardRejection, ServiceError};

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 64;

/// Canonical form of a shopper-typed code: trimmed and upper-cased.
pub fn normalize_code(raw: &str) -> Result<String, ServiceError> {
    let code = raw.trim().to_ascii_uppercase();
    let well_formed = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !well_formed {
        return Err(ServiceError::ValidationError(
            "malformed gift card code".to_string(),
        ));
    }
    Ok(code)
}

/// Shows only the last four characters of a code in logs.
pub fn mask_code(code: &str) -> String {
    let tail: String = code
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

/// Classifies a card for use at `now`. Only a fully usable card passes.
pub fn check_usable(card: &gift_card::Model, now: DateTime<Utc>) -> Result<(), GiftCardRejection> {
    if !card.is_enabled {
        return Err(GiftCardRejection::Disabled);
    }
    if card.is_expired_at(now) {
        return Err(GiftCardRejection::Expired);
    }
    if card.balance <= 0 {
        return Err(GiftCardRejection::NoBalance);
    }
    Ok(())
}

/// Input for issuing a new card from the back office
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IssueGiftCard {
    #[validate(length(min = 4, max = 64))]
    pub code: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update applied by the back office
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AdjustGiftCard {
    #[validate(range(min = 0))]
    pub balance: Option<i64>,
    pub is_enabled: Option<bool>,
}

/// Owns the `0 <= balance <= initial_amount` invariant.
///
/// Every balance change is one conditional `UPDATE`; the row count decides
/// whether it happened.
#[derive(Clone)]
pub struct GiftCardLedger {
    db: Arc<DbPool>,
}

impl GiftCardLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Read-only lookup used for display and for the checkout branch decision.
    #[instrument(skip_all, fields(code = %mask_code(code)))]
    pub async fn validate(&self, code: &str) -> Result<gift_card::Model, ServiceError> {
        let code = normalize_code(code)?;
        Self::validate_on(&*self.db, &code, Utc::now()).await
    }

    /// [`validate`](Self::validate) against any connection, including an open transaction.
    pub async fn validate_on<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<gift_card::Model, ServiceError> {
        let card = gift_card::Entity::find_by_id(code.to_string())
            .one(conn)
            .await?
            .ok_or(ServiceError::GiftCard(GiftCardRejection::NotFound))?;

        check_usable(&card, now).map_err(ServiceError::GiftCard)?;
        Ok(card)
    }

    /// Decrements the balance by `amount` only if the card can still cover it.
    ///
    /// Zero affected rows means the balance moved underneath us and is reported
    /// as [`GiftCardRejection::Exhausted`].
    pub async fn debit_on<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::ValidationError(
                "gift card debit must be positive".to_string(),
            ));
        }

        let result = gift_card::Entity::update_many()
            .col_expr(
                gift_card::Column::Balance,
                Expr::col(gift_card::Column::Balance).sub(amount),
            )
            .col_expr(gift_card::Column::UpdatedAt, Expr::value(now))
            .filter(gift_card::Column::Code.eq(code))
            .filter(gift_card::Column::Balance.gte(amount))
            .filter(gift_card::Column::IsEnabled.eq(true))
            .filter(
                Condition::any()
                    .add(gift_card::Column::ExpiresAt.is_null())
                    .add(gift_card::Column::ExpiresAt.gt(now)),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(code = %mask_code(code), amount, "Gift card debit matched no rows");
            return Err(ServiceError::GiftCard(GiftCardRejection::Exhausted));
        }
        Ok(())
    }

    /// Standalone debit in its own statement.
    #[instrument(skip_all, fields(code = %mask_code(code), amount))]
    pub async fn debit(&self, code: &str, amount: i64) -> Result<(), ServiceError> {
        let code = normalize_code(code)?;
        Self::debit_on(&*self.db, &code, amount, Utc::now()).await
    }

    /// Issues a new card with `balance == initial_amount`.
    #[instrument(skip_all, fields(code = %mask_code(&input.code), amount = input.amount))]
    pub async fn issue(&self, input: IssueGiftCard) -> Result<gift_card::Model, ServiceError> {
        input.validate()?;
        let code = normalize_code(&input.code)?;

        let card = gift_card::ActiveModel {
            code: Set(code),
            balance: Set(input.amount),
            initial_amount: Set(input.amount),
            is_enabled: Set(true),
            expires_at: Set(input.expires_at),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|err| {
            if err.is_unique_violation() {
                ServiceError::Conflict("gift card code already exists".to_string())
            } else {
                err
            }
        })?;

        info!("Gift card issued");
        Ok(card)
    }

    /// Back-office edit. A balance change is a conditional update bounded by
    /// `initial_amount`; both changes commit together.
    #[instrument(skip_all, fields(code = %mask_code(code)))]
    pub async fn adjust(
        &self,
        code: &str,
        patch: AdjustGiftCard,
    ) -> Result<gift_card::Model, ServiceError> {
        patch.validate()?;
        let code = normalize_code(code)?;
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let existing = gift_card::Entity::find_by_id(code.clone())
            .one(&txn)
            .await?
            .ok_or(ServiceError::GiftCard(GiftCardRejection::NotFound))?;

        if let Some(balance) = patch.balance {
            let result = gift_card::Entity::update_many()
                .col_expr(gift_card::Column::Balance, Expr::value(balance))
                .col_expr(gift_card::Column::UpdatedAt, Expr::value(now))
                .filter(gift_card::Column::Code.eq(code.as_str()))
                .filter(gift_card::Column::InitialAmount.gte(balance))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                return Err(ServiceError::ValidationError(format!(
                    "balance {} exceeds initial amount {}",
                    balance, existing.initial_amount
                )));
            }
        }

        if let Some(enabled) = patch.is_enabled {
            gift_card::Entity::update_many()
                .col_expr(gift_card::Column::IsEnabled, Expr::value(enabled))
                .col_expr(gift_card::Column::UpdatedAt, Expr::value(now))
                .filter(gift_card::Column::Code.eq(code.as_str()))
                .exec(&txn)
                .await?;
        }

        let updated = gift_card::Entity::find_by_id(code)
            .one(&txn)
            .await?
            .ok_or(ServiceError::GiftCard(GiftCardRejection::NotFound))?;
        txn.commit().await?;

        info!(
            balance = updated.balance,
            is_enabled = updated.is_enabled,
            "Gift card adjusted"
        );
        Ok(updated)
    }
}
