#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use arbiter::{
    Acceptance, ArbiterConfig, ArbiterError, ClaimId, ForcePayment, InMemorySettledStore,
    SettledClaimStore, Signed, WorkCommitment, WorkReport,
};

pub const NOW: u64 = 1_700_000_000;
pub const DAY: u64 = 24 * 60 * 60;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> B256 {
    B256::from(U256::from(NEXT_ID.fetch_add(1, Ordering::SeqCst)))
}

/// Keys of one provider/requestor pair.
pub struct Parties {
    pub provider: PrivateKeySigner,
    pub provider_payment: Address,
    pub requestor: PrivateKeySigner,
    pub requestor_payment: PrivateKeySigner,
}

impl Parties {
    pub fn random() -> Self {
        Self {
            provider: PrivateKeySigner::random(),
            provider_payment: PrivateKeySigner::random().address(),
            requestor: PrivateKeySigner::random(),
            requestor_payment: PrivateKeySigner::random(),
        }
    }

    pub fn terms(&self, price: u64) -> WorkCommitment {
        WorkCommitment {
            task_id: next_id(),
            subtask_id: next_id(),
            price: U256::from(price),
            provider_id: self.provider.address(),
            provider_payment_address: self.provider_payment,
            requestor_id: self.requestor.address(),
            requestor_payment_address: self.requestor_payment.address(),
        }
    }

    /// A fully signed claim chain for `price`, accepted at `acceptance_time`.
    pub fn claim(
        &self,
        price: u64,
        acceptance_time: u64,
        config: &ArbiterConfig,
    ) -> Signed<Acceptance> {
        self.claim_with_terms(self.terms(price), acceptance_time, config)
    }

    pub fn claim_with_terms(
        &self,
        terms: WorkCommitment,
        acceptance_time: u64,
        config: &ArbiterConfig,
    ) -> Signed<Acceptance> {
        let commitment = Signed::sign(terms, &self.requestor_payment, config).unwrap();
        let report = Signed::sign(
            WorkReport {
                commitment,
                result_hash: B256::repeat_byte(0x5a),
                size: 1024,
            },
            &self.provider,
            config,
        )
        .unwrap();
        Signed::sign(
            Acceptance {
                report,
                acceptance_time,
            },
            &self.requestor,
            config,
        )
        .unwrap()
    }

    /// Three claims accepted a day ago; returns them with their total price.
    pub fn eligible_claims(&self, config: &ArbiterConfig) -> (Vec<Signed<Acceptance>>, U256) {
        let prices = [100u64, 250, 400];
        let claims = prices
            .iter()
            .enumerate()
            .map(|(i, p)| self.claim(*p, NOW - DAY - i as u64, config))
            .collect();
        (claims, U256::from(prices.iter().sum::<u64>()))
    }

    pub fn request(
        &self,
        acceptances: Vec<Signed<Acceptance>>,
        config: &ArbiterConfig,
    ) -> Signed<ForcePayment> {
        Signed::sign(ForcePayment { acceptances }, &self.provider, config).unwrap()
    }
}

/// Settled-claim store whose lookups fail, as a locked or corrupt database would.
pub struct UnreadableStore;

impl SettledClaimStore for UnreadableStore {
    fn is_settled(&self, _claim: &ClaimId) -> Result<bool, ArbiterError> {
        Err(ArbiterError::StoreError("database is locked".to_string()))
    }

    fn record_all(&self, _claims: &[ClaimId], _settled_at: u64) -> Result<(), ArbiterError> {
        Err(ArbiterError::StoreError("database is locked".to_string()))
    }

    fn release_all(&self, _claims: &[ClaimId]) -> Result<(), ArbiterError> {
        Err(ArbiterError::StoreError("database is locked".to_string()))
    }

    fn count(&self) -> usize {
        0
    }
}

/// Settled-claim store that reads fine but refuses every write.
#[derive(Default)]
pub struct UnwritableStore {
    inner: InMemorySettledStore,
}

impl SettledClaimStore for UnwritableStore {
    fn is_settled(&self, claim: &ClaimId) -> Result<bool, ArbiterError> {
        self.inner.is_settled(claim)
    }

    fn record_all(&self, _claims: &[ClaimId], _settled_at: u64) -> Result<(), ArbiterError> {
        Err(ArbiterError::StoreError("disk full".to_string()))
    }

    fn release_all(&self, claims: &[ClaimId]) -> Result<(), ArbiterError> {
        self.inner.release_all(claims)
    }

    fn count(&self) -> usize {
        self.inner.count()
    }
}
