//! Webhook signature verification (HMAC-SHA256).
//!
//! The provider signs `"{timestamp}.{raw_body}"` and sends
//! `stripe-signature: t=<unix>,v1=<hex hmac>`. Verification checks the
//! signature in constant time and rejects timestamps outside a 5-minute
//! tolerance window to block replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum allowed skew between the signed timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature header missing timestamp")]
    MissingTimestamp,
    #[error("signature header missing v1 signature")]
    MissingSignature,
    #[error("signature timestamp outside tolerance window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

/// Hex HMAC-SHA256 over `"{timestamp}.{payload}"`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a full signature header value. Used by tests and by the provider.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign_payload(secret, timestamp, payload))
}

/// Verify a signature header against the raw request body.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<String> = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::MalformedHeader)?;
        match key {
            "t" => {
                timestamp =
                    Some(value.parse().map_err(|_| SignatureError::MalformedHeader)?);
            }
            // The provider may include multiple v1 entries during secret
            // rotation; any match is accepted.
            "v1" => candidates.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if candidates.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let expected = sign_payload(secret, timestamp, payload);
    if candidates.iter().any(|c| constant_time_eq(c, &expected)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
