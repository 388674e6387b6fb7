//! Signed message envelope.
//!
//! A [`Signed<T>`] pairs a payload with the address of its claimed signer and
//! an optional hex signature. A missing signature is a distinct state that
//! never verifies. Every message kind is a variant of [`SignedMessage`], and
//! one signing-hash function dispatches over it.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde::{Deserialize, Serialize};

use crate::claim::{Acceptance, ForcePayment, WorkCommitment, WorkReport};
use crate::eip712;
use crate::notifier::ReceiveRequest;
use crate::response::ArbiterResponse;
use crate::{ArbiterConfig, ArbiterError};

/// Borrowed view of a payload, tagged by message kind.
#[derive(Debug, Clone, Copy)]
pub enum SignedMessage<'a> {
    Commitment(&'a WorkCommitment),
    Report(&'a WorkReport),
    Acceptance(&'a Acceptance),
    ForcePayment(&'a ForcePayment),
    Response(&'a ArbiterResponse),
    Receive(&'a ReceiveRequest),
}

impl SignedMessage<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            SignedMessage::Commitment(_) => "commitment",
            SignedMessage::Report(_) => "report",
            SignedMessage::Acceptance(_) => "acceptance",
            SignedMessage::ForcePayment(_) => "force_payment",
            SignedMessage::Response(_) => "response",
            SignedMessage::Receive(_) => "receive",
        }
    }

    /// EIP-712 signing hash of the payload under the arbiter domain.
    pub fn signing_hash(&self, config: &ArbiterConfig) -> B256 {
        match self {
            SignedMessage::Commitment(c) => eip712::commitment_hash(c, config),
            SignedMessage::Report(r) => eip712::report_hash(r, config),
            SignedMessage::Acceptance(a) => eip712::acceptance_hash(a, config),
            SignedMessage::ForcePayment(fp) => eip712::force_payment_hash(fp, config),
            SignedMessage::Response(r) => eip712::response_hash(r, config),
            SignedMessage::Receive(r) => eip712::receive_hash(r, config),
        }
    }
}

/// Payloads that can travel inside a [`Signed`] envelope.
pub trait Signable {
    fn message(&self) -> SignedMessage<'_>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signed<T> {
    pub payload: T,
    /// Address the signature is claimed to recover to.
    pub signer: Address,
    /// 0x-prefixed 65-byte signature. `None` never verifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl<T: Signable> Signed<T> {
    /// Sign `payload` with `signer` under the arbiter domain.
    pub fn sign(
        payload: T,
        signer: &PrivateKeySigner,
        config: &ArbiterConfig,
    ) -> Result<Self, ArbiterError> {
        let hash = payload.message().signing_hash(config);
        let sig = signer
            .sign_hash_sync(&hash)
            .map_err(|e| ArbiterError::SignatureError(format!("signing failed: {e}")))?;
        Ok(Self {
            payload,
            signer: signer.address(),
            signature: Some(eip712::encode_signature_hex(&sig)),
        })
    }

    pub fn unsigned(payload: T, signer: Address) -> Self {
        Self {
            payload,
            signer,
            signature: None,
        }
    }

    pub fn signing_hash(&self, config: &ArbiterConfig) -> B256 {
        self.payload.message().signing_hash(config)
    }

    /// Raw signature bytes, empty when unsigned or undecodable. Used when an
    /// outer message binds this one.
    pub fn signature_bytes(&self) -> Vec<u8> {
        self.signature
            .as_deref()
            .and_then(|s| eip712::decode_signature_hex(s).ok())
            .unwrap_or_default()
    }

    /// Recover the address that produced the signature.
    pub fn recover(&self, config: &ArbiterConfig) -> Result<Address, ArbiterError> {
        let sig = self
            .signature
            .as_deref()
            .ok_or_else(|| ArbiterError::SignatureError("message is not signed".to_string()))?;
        let bytes = eip712::decode_signature_hex(sig)?;
        eip712::recover_signer(&self.signing_hash(config), &bytes)
    }

    pub fn verify(&self, claimed_signer: Address, config: &ArbiterConfig) -> bool {
        verify(self, claimed_signer, config)
    }
}

/// Check that `message` carries a valid signature by `claimed_signer`.
///
/// Pure: the message is only read.
pub fn verify<T: Signable>(
    message: &Signed<T>,
    claimed_signer: Address,
    config: &ArbiterConfig,
) -> bool {
    if message.signer != claimed_signer {
        return false;
    }
    match message.recover(config) {
        Ok(recovered) => recovered == claimed_signer,
        Err(e) => {
            tracing::debug!(
                kind = message.payload.message().kind(),
                signer = %claimed_signer,
                error = %e,
                "signature verification failed"
            );
            false
        }
    }
}
