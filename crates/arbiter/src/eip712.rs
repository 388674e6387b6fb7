//! EIP-712 typed-data hashing and signature recovery for every message kind.
//!
//! Provides functions for:
//! - Building the arbiter domain ([`arbiter_domain`])
//! - Computing per-kind signing hashes ([`commitment_hash`], [`report_hash`], ...)
//! - Recovering signers with EIP-2 malleability protection ([`recover_signer`])
//! - Encoding and decoding hex signatures

use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::claim::{Acceptance, ForcePayment, WorkCommitment, WorkReport};
use crate::notifier::ReceiveRequest;
use crate::response::ArbiterResponse;
use crate::{
    AcceptanceData, ArbiterConfig, ArbiterError, ForcePaymentCommittedData, ForcePaymentData,
    ReceiveRequestData, VerdictData, WorkCommitmentData, WorkReportData,
};

/// Verdict kinds inside [`VerdictData`].
const VERDICT_REFUSED: u8 = 0;
const VERDICT_REJECTED: u8 = 1;

/// Build the EIP-712 domain; the deposit contract is the verifying contract.
pub fn arbiter_domain(config: &ArbiterConfig) -> Eip712Domain {
    Eip712Domain {
        name: Some(std::borrow::Cow::Owned(config.eip712_domain_name.clone())),
        version: Some(std::borrow::Cow::Owned(
            config.eip712_domain_version.clone(),
        )),
        chain_id: Some(U256::from(config.chain_id)),
        verifying_contract: Some(config.deposit_contract),
        salt: None,
    }
}

pub fn commitment_hash(c: &WorkCommitment, config: &ArbiterConfig) -> B256 {
    let data = WorkCommitmentData {
        taskId: c.task_id,
        subtaskId: c.subtask_id,
        price: c.price,
        providerId: c.provider_id,
        providerPaymentAddress: c.provider_payment_address,
        requestorId: c.requestor_id,
        requestorPaymentAddress: c.requestor_payment_address,
    };
    data.eip712_signing_hash(&arbiter_domain(config))
}

pub fn report_hash(r: &WorkReport, config: &ArbiterConfig) -> B256 {
    let data = WorkReportData {
        commitmentHash: r.commitment.signing_hash(config),
        commitmentSignature: Bytes::from(r.commitment.signature_bytes()),
        resultHash: r.result_hash,
        size: r.size,
    };
    data.eip712_signing_hash(&arbiter_domain(config))
}

pub fn acceptance_hash(a: &Acceptance, config: &ArbiterConfig) -> B256 {
    let data = AcceptanceData {
        reportHash: a.report.signing_hash(config),
        reportSignature: Bytes::from(a.report.signature_bytes()),
        acceptanceTime: a.acceptance_time,
    };
    data.eip712_signing_hash(&arbiter_domain(config))
}

pub fn force_payment_hash(fp: &ForcePayment, config: &ArbiterConfig) -> B256 {
    let data = ForcePaymentData {
        acceptanceHashes: fp
            .acceptances
            .iter()
            .map(|a| a.signing_hash(config))
            .collect(),
    };
    data.eip712_signing_hash(&arbiter_domain(config))
}

pub fn response_hash(r: &ArbiterResponse, config: &ArbiterConfig) -> B256 {
    let domain = arbiter_domain(config);
    match r {
        ArbiterResponse::ServiceRefused(refused) => VerdictData {
            kind: VERDICT_REFUSED,
            reason: refused.reason.code(),
            requestDigest: refused.request_digest,
        }
        .eip712_signing_hash(&domain),
        ArbiterResponse::ForcePaymentRejected(rejected) => VerdictData {
            kind: VERDICT_REJECTED,
            reason: rejected.reason.code(),
            requestDigest: rejected.request_digest,
        }
        .eip712_signing_hash(&domain),
        ArbiterResponse::ForcePaymentCommitted(committed) => ForcePaymentCommittedData {
            paymentTs: committed.payment_ts,
            requestorId: committed.requestor_id,
            providerPaymentAddress: committed.provider_payment_address,
            amountPaid: committed.amount_paid,
            amountPending: committed.amount_pending,
            recipient: committed.recipient.code(),
        }
        .eip712_signing_hash(&domain),
    }
}

pub fn receive_hash(r: &ReceiveRequest, config: &ArbiterConfig) -> B256 {
    let data = ReceiveRequestData {
        recipient: r.recipient,
        issuedAt: r.issued_at,
    };
    data.eip712_signing_hash(&arbiter_domain(config))
}

/// secp256k1 curve order N / 2: signatures with s > this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the signer of a prehashed message. Rejects wrong-length and
/// high-s signatures.
pub fn recover_signer(hash: &B256, signature_bytes: &[u8]) -> Result<Address, ArbiterError> {
    if signature_bytes.len() != 65 {
        return Err(ArbiterError::SignatureError(format!(
            "signature must be 65 bytes, got {}",
            signature_bytes.len()
        )));
    }

    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| ArbiterError::SignatureError(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(ArbiterError::SignatureError(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    sig.recover_address_from_prehash(hash)
        .map_err(|e| ArbiterError::SignatureError(format!("recovery failed: {e}")))
}

/// Encode a signature as 0x-prefixed hex (65 bytes, v = 27 or 28).
pub fn encode_signature_hex(sig: &Signature) -> String {
    format!("0x{}", alloy::hex::encode(sig.as_bytes()))
}

pub fn decode_signature_hex(s: &str) -> Result<Vec<u8>, ArbiterError> {
    alloy::hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| ArbiterError::SignatureError(format!("invalid hex signature: {e}")))
}
