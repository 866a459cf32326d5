use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};

use crate::entities::inventory_variant::VariantKey;

fn current_request_id() -> Option<String> {
    crate::request_context::current_request_id().map(|rid| rid.as_str().to_string())
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Machine-readable reason the storefront UI can branch on
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

/// Why a gift card cannot be used for the requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardRejection {
    NotFound,
    Disabled,
    Expired,
    NoBalance,
    /// Balance dropped below the reserved discount between quote and commit.
    Exhausted,
}

impl GiftCardRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "gift_card_not_found",
            Self::Disabled => "gift_card_disabled",
            Self::Expired => "gift_card_expired",
            Self::NoBalance => "gift_card_no_balance",
            Self::Exhausted => "gift_card_exhausted",
        }
    }
}

impl std::fmt::Display for GiftCardRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotFound => "gift card not found",
            Self::Disabled => "gift card is disabled",
            Self::Expired => "gift card has expired",
            Self::NoBalance => "gift card has no remaining balance",
            Self::Exhausted => "gift card balance is insufficient for the reserved discount",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity {quantity} for {variant}")]
    InvalidQuantity { variant: VariantKey, quantity: i32 },

    #[error("Variant {0} is not sellable")]
    VariantNotSellable(VariantKey),

    #[error("Insufficient stock for variant {0}")]
    InsufficientStock(VariantKey),

    #[error("Gift card rejected: {0}")]
    GiftCard(GiftCardRejection),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid payment metadata: {0}")]
    InvalidMetadata(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// True when the error came from a unique index rejecting a duplicate row.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseError(err) => {
                matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
            }
            _ => false,
        }
    }

    /// Infrastructure failures that may clear on their own, such as a dropped
    /// connection, a lock timeout or a deadlock victim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError(_)) && !self.is_unique_violation()
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyCart
            | Self::InvalidQuantity { .. }
            | Self::VariantNotSellable(_)
            | Self::ValidationError(_)
            | Self::InvalidMetadata(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::GiftCard(GiftCardRejection::NotFound) => StatusCode::NOT_FOUND,
            Self::GiftCard(_) | Self::InsufficientStock(_) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::VariantNotSellable(_) => "variant_not_sellable",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::GiftCard(reason) => reason.as_str(),
            Self::ValidationError(_) => "validation_error",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidMetadata(_) => "invalid_metadata",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::PaymentProvider(_) => "payment_provider_error",
            Self::SerializationError(_) => "serialization_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::PaymentProvider(_) => "Payment provider unavailable".to_string(),
            Self::InvalidSignature(_) => "Invalid signature".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn variant() -> VariantKey {
        VariantKey::new(7, 2, 3)
    }

    #[tokio::test]
    async fn error_response_includes_request_id() {
        let response = crate::request_context::scope_request_id(
            crate::request_context::RequestId::new("req-123"),
            async { ServiceError::InsufficientStock(variant()).into_response() },
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code, "insufficient_stock");
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::GiftCard(GiftCardRejection::Disabled).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::GiftCard(GiftCardRejection::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidSignature("bad".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::PaymentProvider("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_database_failures_are_retryable() {
        assert!(ServiceError::DatabaseError(DbErr::Custom("connection reset".into())).is_retryable());
        assert!(!ServiceError::InsufficientStock(variant()).is_retryable());
        assert!(!ServiceError::GiftCard(GiftCardRejection::Exhausted).is_retryable());
        assert!(!ServiceError::InvalidMetadata("cart".into()).is_retryable());
    }

    #[test]
    fn gift_card_reasons_have_distinct_codes() {
        let codes = [
            GiftCardRejection::NotFound,
            GiftCardRejection::Disabled,
            GiftCardRejection::Expired,
            GiftCardRejection::NoBalance,
            GiftCardRejection::Exhausted,
        ]
        .map(|r| ServiceError::GiftCard(r).code());
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("password=hunter2".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("stack".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InsufficientStock(variant()).response_message(),
            "Insufficient stock for variant product 7 size 2 color 3"
        );
    }

    #[test]
    fn custom_db_error_is_not_a_unique_violation() {
        assert!(!ServiceError::DatabaseError(DbErr::Custom("x".into())).is_unique_violation());
    }
}
