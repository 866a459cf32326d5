use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix seconds>,v1=<hex hmac>[,v1=...]`
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Byte comparison whose running time depends only on the lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parsed signature header.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, ServiceError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    ServiceError::InvalidSignature("timestamp is not a number".to_string())
                })?)
            }
            "v1" if !value.is_empty() => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ServiceError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(ServiceError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Verifies inbound payment events against the shared webhook secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// True when no secret is configured; only allowed in development.
    pub fn is_disabled(&self) -> bool {
        self.secret.is_empty()
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Checks `header` against `payload` at unix time `now`.
    pub fn verify(
        &self,
        header: Option<&str>,
        payload: &[u8],
        now: i64,
    ) -> Result<(), ServiceError> {
        if self.is_disabled() {
            warn!("Webhook secret not configured; accepting unsigned payment event");
            return Ok(());
        }

        let header = header
            .ok_or_else(|| ServiceError::InvalidSignature("missing signature header".to_string()))?;
        let parsed = parse_header(header)?;

        if now.abs_diff(parsed.timestamp) > self.tolerance_secs {
            return Err(ServiceError::InvalidSignature(
                "timestamp outside tolerance".to_string(),
            ));
        }

        let expected = self.mac_for(parsed.timestamp, payload)?.finalize().into_bytes();
        let matched = parsed.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| constant_time_eq(&bytes, expected.as_slice()))
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(ServiceError::InvalidSignature(
                "no matching signature".to_string(),
            ))
        }
    }

    /// Produces a header value for `payload`; used by tests and local tooling.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, ServiceError> {
        let digest = self.mac_for(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", 300)
    }

    #[test]
    fn signed_payload_verifies() {
        let header = verifier().sign(b"{\"id\":1}", NOW).unwrap();
        assert!(verifier().verify(Some(&header), b"{\"id\":1}", NOW).is_ok());
    }

    #[test]
    fn modified_payload_fails() {
        let header = verifier().sign(b"{\"id\":1}", NOW).unwrap();
        assert_matches!(
            verifier().verify(Some(&header), b"{\"id\":2}", NOW),
            Err(ServiceError::InvalidSignature(_))
        );
    }

    #[test]
    fn stale_timestamp_fails() {
        let header = verifier().sign(b"{}", NOW - 301).unwrap();
        assert!(verifier().verify(Some(&header), b"{}", NOW).is_err());
    }

    #[test]
    fn rotated_secret_accepted_via_second_v1() {
        let old = WebhookVerifier::new("whsec_old", 300).sign(b"{}", NOW).unwrap();
        let new = verifier().sign(b"{}", NOW).unwrap();
        let new_sig = new.split_once(",v1=").unwrap().1;
        let header = format!("{},v1={}", old, new_sig);
        assert!(verifier().verify(Some(&header), b"{}", NOW).is_ok());
    }

    #[test]
    fn malformed_headers_fail() {
        for header in ["", "v1=abc", "t=1700000000", "t=abc,v1=00", "t=1700000000,v1=zz"] {
            assert!(
                verifier().verify(Some(header), b"{}", NOW).is_err(),
                "header {header:?} should be rejected"
            );
        }
        assert!(verifier().verify(None, b"{}", NOW).is_err());
    }

    #[test]
    fn disabled_verifier_accepts_anything() {
        let open = WebhookVerifier::new("", 300);
        assert!(open.is_disabled());
        assert!(open.verify(None, b"{}", NOW).is_ok());
    }

    #[test]
    fn constant_time_eq_compares_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
