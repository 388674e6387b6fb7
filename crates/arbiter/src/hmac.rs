//! HMAC-SHA256 signing of outbound notification bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of `body` under `key`.
pub fn compute_hmac(key: &[u8], body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        // HMAC accepts keys of any length.
        return String::new();
    };
    mac.update(body);
    alloy::hex::encode(mac.finalize().into_bytes())
}

/// Derive a purpose-bound key from a shared secret, so the same secret
/// can never produce a valid signature for a different purpose.
pub fn derive_key(secret: &[u8], purpose: &str) -> Vec<u8> {
    compute_hmac(secret, purpose.as_bytes()).into_bytes()
}

/// Verify a hex HMAC over `body`, as a webhook receiver does with the
/// `X-Arbiter-Signature` header. Constant time in the MAC comparison;
/// undecodable hex is compared as zeros rather than returning early.
pub fn verify_hmac(key: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(body);
    let expected = alloy::hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}
