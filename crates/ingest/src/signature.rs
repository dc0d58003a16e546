//! Webhook signature verification
//!
//! Providers sign the raw request body with HMAC-SHA256 keyed by a shared
//! secret and send the hex digest in a signature header, optionally prefixed
//! with the algorithm name (`sha256=...`). Verification recomputes the digest
//! over the exact raw bytes and compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed skew between the provider-asserted event timestamp and
/// server time, in either direction.
pub const REPLAY_WINDOW: Duration = Duration::minutes(5);

/// Verify an HMAC-SHA256 signature over the raw request body.
///
/// Returns `false` on any malformed input; never panics. The caller treats
/// `false` as "unauthenticated".
pub fn verify(raw_body: &[u8], signature_header: &str, shared_secret: &str) -> bool {
    if signature_header.is_empty() || shared_secret.is_empty() {
        return false;
    }

    // Strip an optional algorithm prefix
    let supplied = signature_header
        .strip_prefix("sha256=")
        .unwrap_or(signature_header)
        .trim();

    let supplied_bytes = match hex::decode(supplied) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(shared_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();

    // Constant-time comparison; ct_eq on mismatched lengths is still
    // constant time for the shorter buffer, so check length via ct path too.
    if supplied_bytes.len() != computed.len() {
        return false;
    }
    computed.ct_eq(&supplied_bytes).into()
}

/// Compute the hex signature for a body. Used by tests and by outbound
/// webhook replay tooling.
pub fn compute(raw_body: &[u8], shared_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(shared_secret.as_bytes()).ok()?;
    mac.update(raw_body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Check that an event timestamp falls within the replay window around `now`.
pub fn is_fresh(timestamp: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    let skew = now - timestamp;
    skew.abs() <= window
}
