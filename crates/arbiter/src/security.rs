//! Constant-time comparison of shared secrets.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking their content or length through timing.
///
/// Both sides are hashed to fixed-length digests first, then compared with
/// `subtle::ConstantTimeEq`. Used for bearer tokens on operator endpoints.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_tokens_match() {
        assert!(constant_time_eq(b"metrics-token", b"metrics-token"));
    }

    #[test]
    fn test_different_tokens_do_not_match() {
        assert!(!constant_time_eq(b"metrics-token", b"metrics-tokem"));
        assert!(!constant_time_eq(b"short", b"a much longer token"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
