use alloy::primitives::{TxHash, U256};
use thiserror::Error;

/// Errors returned by arbiter operations.
///
/// Protocol outcomes (refusals, rejections) are never errors; these are
/// infrastructure failures. Only [`ArbiterError::TransferOutcomeUnknown`] and
/// [`ArbiterError::NeedsReconciliation`] can leave a side effect behind.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("ledger error: {0}")]
    LedgerError(String),

    #[error("insufficient deposit: {available} available, {requested} requested")]
    InsufficientDeposit { available: U256, requested: U256 },

    #[error("arbiter busy: {0}")]
    Busy(String),

    #[error("notification error: {0}")]
    NotificationError(String),

    #[error("settled-claim store error: {0}")]
    StoreError(String),

    /// The transfer was broadcast but its receipt never arrived. It may still
    /// be mined; the claims stay reserved until an operator checks `tx`.
    #[error("transfer {tx} outcome unknown: {reason}")]
    TransferOutcomeUnknown { tx: TxHash, reason: String },

    /// The transfer failed but the reserved claims could not be released.
    #[error("settled-claim store needs reconciliation: {0}")]
    NeedsReconciliation(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl ArbiterError {
    /// Whether the caller may resubmit the same request later.
    ///
    /// True only when nothing was committed: the ledger rejected the call
    /// before broadcast or reverted it, or the store failed before any
    /// transfer started.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArbiterError::LedgerError(_)
                | ArbiterError::InsufficientDeposit { .. }
                | ArbiterError::Busy(_)
                | ArbiterError::StoreError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_failures_are_retryable() {
        assert!(ArbiterError::LedgerError("rpc down".into()).is_retryable());
        assert!(ArbiterError::InsufficientDeposit {
            available: U256::from(1u64),
            requested: U256::from(2u64),
        }
        .is_retryable());
        assert!(!ArbiterError::SignatureError("bad".into()).is_retryable());
        assert!(!ArbiterError::ConfigError("bad".into()).is_retryable());
    }

    #[test]
    fn test_store_failures_are_retryable() {
        assert!(ArbiterError::StoreError("disk I/O error".into()).is_retryable());
    }

    #[test]
    fn test_unconfirmed_transfer_is_not_retryable() {
        let err = ArbiterError::TransferOutcomeUnknown {
            tx: TxHash::repeat_byte(0xab),
            reason: "receipt timed out".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("0xabab"));
        assert!(!ArbiterError::NeedsReconciliation("release failed".into()).is_retryable());
    }
}
