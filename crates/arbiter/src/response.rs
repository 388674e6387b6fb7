//! Outcome taxonomy and the signed wire responses derived from it.
//!
//! Every `settle` call ends in exactly one [`Outcome`]:
//!
//! - `Refused(InvalidRequest)`: malformed batch, bad signature, or mixed actors
//! - `Rejected(TimestampError)`: a claim is still inside its grace period
//! - `Rejected(NoUnsettledTasksFound)`: nothing is owed
//! - `Settled { .. }`: the transfer committed and both parties are notified

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::envelope::{Signable, SignedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefusalReason {
    InvalidRequest,
}

impl RefusalReason {
    pub fn code(self) -> u8 {
        match self {
            RefusalReason::InvalidRequest => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefusalReason::InvalidRequest => "InvalidRequest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    TimestampError,
    NoUnsettledTasksFound,
}

impl RejectionReason {
    pub fn code(self) -> u8 {
        match self {
            RejectionReason::TimestampError => 0,
            RejectionReason::NoUnsettledTasksFound => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::TimestampError => "TimestampError",
            RejectionReason::NoUnsettledTasksFound => "NoUnsettledTasksFound",
        }
    }
}

/// Which party a copy of a settlement outcome is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientRole {
    Provider,
    Requestor,
}

impl RecipientRole {
    pub fn code(self) -> u8 {
        match self {
            RecipientRole::Provider => 0,
            RecipientRole::Requestor => 1,
        }
    }
}

/// Terminal result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Settled {
        amount_paid: U256,
        amount_pending: U256,
        /// Latest acceptance time in the batch.
        settled_at: u64,
    },
    Rejected {
        reason: RejectionReason,
    },
    Refused {
        reason: RefusalReason,
    },
}

impl Outcome {
    /// Metrics/log label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Settled { .. } => "settled",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Refused { .. } => "refused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRefused {
    pub reason: RefusalReason,
    pub request_digest: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcePaymentRejected {
    pub reason: RejectionReason,
    /// Signing hash of the rejected force-payment request.
    pub request_digest: B256,
}

/// One party's copy of a committed settlement. The two copies differ only
/// in `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcePaymentCommitted {
    pub payment_ts: u64,
    pub requestor_id: Address,
    pub provider_payment_address: Address,
    pub amount_paid: U256,
    pub amount_pending: U256,
    pub recipient: RecipientRole,
}

/// Wire response signed by the arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArbiterResponse {
    ServiceRefused(ServiceRefused),
    ForcePaymentRejected(ForcePaymentRejected),
    ForcePaymentCommitted(ForcePaymentCommitted),
}

impl Signable for ArbiterResponse {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::Response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_tagged() {
        let r = ArbiterResponse::ForcePaymentRejected(ForcePaymentRejected {
            reason: RejectionReason::TimestampError,
            request_digest: B256::ZERO,
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "ForcePaymentRejected");
        assert_eq!(json["reason"], "TimestampError");
        assert!(json.get("requestDigest").is_some());
    }

    #[test]
    fn test_reason_codes_are_distinct() {
        assert_ne!(
            RejectionReason::TimestampError.code(),
            RejectionReason::NoUnsettledTasksFound.code()
        );
        assert_ne!(RecipientRole::Provider.code(), RecipientRole::Requestor.code());
    }
}
