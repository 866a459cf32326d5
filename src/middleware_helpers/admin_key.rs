use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crate::payments::signature::constant_time_eq;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Header carrying the back-office API key
pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// Configured back-office key; `None` disables the admin routes entirely.
#[derive(Clone, Debug, Default)]
pub struct AdminKey(pub Option<String>);

impl AdminKey {
    fn accepts(&self, presented: &str) -> bool {
        match &self.0 {
            Some(expected) if !expected.is_empty() => {
                let a = Sha256::digest(expected.as_bytes());
                let b = Sha256::digest(presented.as_bytes());
                constant_time_eq(a.as_slice(), b.as_slice())
            }
            _ => false,
        }
    }
}

/// Rejects requests whose `x-api-key` does not match the configured admin key.
pub async fn require_admin_key(
    State(key): State<AdminKey>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !key.accepts(presented) {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return ServiceError::Unauthorized("missing or invalid API key".to_string())
            .into_response();
    }

    next.run(request).await
}
