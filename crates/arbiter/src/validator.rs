//! Validation stages of a force-payment batch.
//!
//! Stages run in order and stop at the first failure:
//!
//! 1. non-empty batch
//! 2. signature integrity of every acceptance, report and commitment
//! 3. actor consistency across the batch
//! 4. timing: every claim past its grace period (all or nothing)
//! 5. aggregate amount over claims not yet settled
//!
//! Validation only reads its inputs; calling it twice on the same batch with
//! the same clock and store contents yields the same result. A failed read of
//! the settled-claim store is returned as an error, never as a verdict.

use std::collections::HashSet;

use alloy::primitives::{Address, B256, U256};

use crate::claim::{ClaimId, ForcePayment};
use crate::envelope::Signed;
use crate::response::{Outcome, RefusalReason, RejectionReason};
use crate::settled_store::SettledClaimStore;
use crate::{ArbiterConfig, ArbiterError};

/// A failed validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Refused(RefusalReason),
    Rejected(RejectionReason),
}

impl From<Verdict> for Outcome {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Refused(reason) => Outcome::Refused { reason },
            Verdict::Rejected(reason) => Outcome::Rejected { reason },
        }
    }
}

/// A batch that passed stages 1–5 and is ready for the funding check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    pub requestor_id: Address,
    pub requestor_payment_address: Address,
    pub provider_id: Address,
    pub provider_payment_address: Address,
    /// Claims that contribute to `total`.
    pub unsettled: Vec<ClaimId>,
    /// `V`: sum of prices over unsettled claims.
    pub total: U256,
    /// Latest acceptance time in the batch.
    pub settled_at: u64,
}

/// A validated batch or the verdict that stopped it.
pub type Validation = Result<ValidatedBatch, Verdict>;

#[derive(Debug, Clone)]
pub struct ClaimValidator {
    config: ArbiterConfig,
}

impl ClaimValidator {
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Validate a signed request: the batch stages plus the requirement that
    /// the request is signed by the batch's provider.
    pub fn validate_request(
        &self,
        request: &Signed<ForcePayment>,
        now: u64,
        settled: &dyn SettledClaimStore,
    ) -> Result<Validation, ArbiterError> {
        self.run(&request.payload, Some(request), now, settled)
    }

    /// Validate a bare batch (stages 1–5).
    pub fn validate(
        &self,
        batch: &ForcePayment,
        now: u64,
        settled: &dyn SettledClaimStore,
    ) -> Result<Validation, ArbiterError> {
        self.run(batch, None, now, settled)
    }

    fn run(
        &self,
        batch: &ForcePayment,
        request: Option<&Signed<ForcePayment>>,
        now: u64,
        settled: &dyn SettledClaimStore,
    ) -> Result<Validation, ArbiterError> {
        let invalid = Verdict::Refused(RefusalReason::InvalidRequest);

        // 1. Non-empty
        let Some(first) = batch.acceptances.first() else {
            tracing::warn!("force payment refused: empty batch");
            return Ok(Err(invalid));
        };

        // 2. Signature integrity
        for (index, acceptance) in batch.acceptances.iter().enumerate() {
            let terms = acceptance.terms();
            let checks = [
                ("acceptance", acceptance.verify(terms.requestor_id, &self.config)),
                ("report", acceptance.report().verify(terms.provider_id, &self.config)),
                (
                    "commitment",
                    acceptance
                        .commitment()
                        .verify(terms.requestor_payment_address, &self.config),
                ),
            ];
            if let Some((kind, _)) = checks.iter().find(|(_, ok)| !ok) {
                tracing::warn!(index, kind, "force payment refused: invalid signature");
                return Ok(Err(invalid));
            }
        }
        if let Some(request) = request {
            if !request.verify(request.signer, &self.config) {
                tracing::warn!(signer = %request.signer, "force payment refused: invalid request signature");
                return Ok(Err(invalid));
            }
        }

        // 3. Actor consistency
        let head = first.terms();
        let consistent = batch.acceptances.iter().all(|a| {
            let t = a.terms();
            t.requestor_id == head.requestor_id
                && t.requestor_payment_address == head.requestor_payment_address
                && t.provider_payment_address == head.provider_payment_address
                && t.provider_id == head.provider_id
        });
        if !consistent {
            tracing::warn!(
                requestor = %head.requestor_id,
                "force payment refused: batch mixes requestors or provider accounts"
            );
            return Ok(Err(invalid));
        }
        if let Some(request) = request {
            if request.signer != head.provider_id {
                tracing::warn!(
                    signer = %request.signer,
                    provider = %head.provider_id,
                    "force payment refused: request not signed by the batch's provider"
                );
                return Ok(Err(invalid));
            }
        }
        let claim_ids: Vec<ClaimId> = batch
            .acceptances
            .iter()
            .map(|a| a.claim_id(&self.config))
            .collect();
        let mut seen: HashSet<B256> = HashSet::with_capacity(claim_ids.len());
        if !claim_ids.iter().all(|id| seen.insert(*id)) {
            tracing::warn!("force payment refused: duplicate claim in batch");
            return Ok(Err(invalid));
        }

        // 4. Timing eligibility (all or nothing)
        let grace = self.config.payment_grace_period_secs;
        if let Some(premature) = batch
            .acceptances
            .iter()
            .find(|a| !self.is_past_grace_period(a.acceptance_time(), now))
        {
            tracing::info!(
                acceptance_time = premature.acceptance_time(),
                now,
                grace,
                "force payment rejected: claim still inside grace period"
            );
            return Ok(Err(Verdict::Rejected(RejectionReason::TimestampError)));
        }

        // 5. Aggregate amount over unsettled claims
        let mut total = U256::ZERO;
        let mut unsettled = Vec::with_capacity(claim_ids.len());
        for (acceptance, id) in batch.acceptances.iter().zip(&claim_ids) {
            if settled.is_settled(id)? {
                continue;
            }
            total = match total.checked_add(acceptance.terms().price) {
                Some(sum) => sum,
                None => {
                    tracing::warn!("force payment refused: amount overflow");
                    return Ok(Err(invalid));
                }
            };
            unsettled.push(*id);
        }
        if total.is_zero() {
            tracing::info!(
                requestor = %head.requestor_id,
                claims = claim_ids.len(),
                "force payment rejected: no unsettled tasks"
            );
            return Ok(Err(Verdict::Rejected(RejectionReason::NoUnsettledTasksFound)));
        }

        let settled_at = batch
            .acceptances
            .iter()
            .map(|a| a.acceptance_time())
            .max()
            .unwrap_or_default();

        Ok(Ok(ValidatedBatch {
            requestor_id: head.requestor_id,
            requestor_payment_address: head.requestor_payment_address,
            provider_id: head.provider_id,
            provider_payment_address: head.provider_payment_address,
            unsettled,
            total,
            settled_at,
        }))
    }

    /// A claim accepted in the future is never eligible.
    fn is_past_grace_period(&self, acceptance_time: u64, now: u64) -> bool {
        acceptance_time <= now && now - acceptance_time >= self.config.payment_grace_period_secs
    }
}
