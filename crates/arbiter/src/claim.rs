//! The claim chain: commitment, report, acceptance, and the force-payment batch.
//!
//! Each later message embeds a full signed copy of the earlier one, so a
//! single [`Signed<Acceptance>`] carries everything needed to prove that the
//! provider did the work, the requestor accepted it, and at what price.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::envelope::{Signable, Signed, SignedMessage};
use crate::ArbiterConfig;

/// Identifies a claim: the EIP-712 signing hash of its work commitment.
pub type ClaimId = B256;

/// Terms agreed by the requestor before work starts. Signed by the
/// requestor's payment key (`requestor_payment_address`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkCommitment {
    pub task_id: B256,
    pub subtask_id: B256,
    pub price: U256,
    pub provider_id: Address,
    pub provider_payment_address: Address,
    pub requestor_id: Address,
    pub requestor_payment_address: Address,
}

/// Provider's assertion that the committed work was performed. Signed by
/// `commitment.provider_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkReport {
    pub commitment: Signed<WorkCommitment>,
    pub result_hash: B256,
    pub size: u64,
}

/// Requestor's acceptance of a report. Signed by `commitment.requestor_id`.
/// `acceptance_time` starts the payment grace period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    pub report: Signed<WorkReport>,
    pub acceptance_time: u64,
}

/// A provider's consolidated bill against one requestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcePayment {
    pub acceptances: Vec<Signed<Acceptance>>,
}

impl Signable for WorkCommitment {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::Commitment(self)
    }
}

impl Signable for WorkReport {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::Report(self)
    }
}

impl Signable for Acceptance {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::Acceptance(self)
    }
}

impl Signable for ForcePayment {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::ForcePayment(self)
    }
}

impl Signed<Acceptance> {
    pub fn report(&self) -> &Signed<WorkReport> {
        &self.payload.report
    }

    pub fn commitment(&self) -> &Signed<WorkCommitment> {
        &self.payload.report.payload.commitment
    }

    /// The agreed terms at the root of this claim.
    pub fn terms(&self) -> &WorkCommitment {
        &self.commitment().payload
    }

    pub fn acceptance_time(&self) -> u64 {
        self.payload.acceptance_time
    }

    pub fn claim_id(&self, config: &ArbiterConfig) -> ClaimId {
        self.commitment().signing_hash(config)
    }
}
