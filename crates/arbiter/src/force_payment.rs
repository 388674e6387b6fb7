use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::claim::ForcePayment;
use crate::envelope::Signed;
use crate::ledger::DepositLedger;
use crate::notifier::{NotificationChannel, SettlementNotifier};
use crate::response::{ArbiterResponse, ForcePaymentRejected, Outcome, ServiceRefused};
use crate::settled_store::{InMemorySettledStore, SettledClaimStore};
use crate::validator::{ClaimValidator, ValidatedBatch, Validation, Verdict};
use crate::{ArbiterConfig, ArbiterError, PendingPolicy};

/// Current unix time in seconds. A clock before the epoch reads as 0, which
/// makes every claim premature rather than eligible.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_else(|_| {
            tracing::error!("system clock before UNIX epoch, treating now as 0");
            0
        })
}

/// The arbitration service: verifies claim batches and forces payment out of
/// the requestor's deposit.
pub struct ForcePaymentArbiter<L> {
    signer: PrivateKeySigner,
    ledger: L,
    validator: ClaimValidator,
    notifier: SettlementNotifier,
    /// Claims already paid out. In-memory by default.
    settled: Arc<dyn SettledClaimStore>,
    /// Per-requestor mutex held from balance query through transfer.
    requestor_locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

impl<L> ForcePaymentArbiter<L> {
    /// Create an arbiter with its own signing identity, ledger and channel.
    ///
    /// # Warning
    /// The default in-memory settled-claim store forgets paid claims on
    /// restart. For production use, chain `.with_settled_store(sqlite_store)`.
    pub fn new(
        signer: PrivateKeySigner,
        ledger: L,
        channel: Arc<dyn NotificationChannel>,
        config: ArbiterConfig,
    ) -> Self {
        Self {
            notifier: SettlementNotifier::new(signer.clone(), config.clone(), channel),
            signer,
            ledger,
            validator: ClaimValidator::new(config),
            settled: Arc::new(InMemorySettledStore::new()),
            requestor_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_settled_store(mut self, store: Arc<dyn SettledClaimStore>) -> Self {
        self.settled = store;
        self
    }

    /// The arbiter's signing address; every response is signed by it.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn config(&self) -> &ArbiterConfig {
        self.validator.config()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn settled_store(&self) -> &Arc<dyn SettledClaimStore> {
        &self.settled
    }

    pub fn notification_failures(&self) -> u64 {
        self.notifier.delivery_failures()
    }

    /// Start a background task that drops idle requestor locks every 60 seconds.
    pub fn start_lock_cleanup(&self) {
        let locks = Arc::clone(&self.requestor_locks);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                // A lock is idle when nobody else holds a clone and nobody holds the mutex.
                let before = locks.len();
                locks.retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
                let removed = before - locks.len();
                if removed > 0 {
                    tracing::info!(removed, "cleaned up idle requestor locks");
                }
            }
        });
    }

    const MAX_REQUESTOR_LOCKS: usize = 100_000;

    /// Get or create the mutex serializing settlements against `requestor`'s deposit.
    /// The cap can be overshot by the number of concurrent workers; the
    /// cleanup task reclaims idle entries.
    fn requestor_lock(&self, requestor: Address) -> Result<Arc<Mutex<()>>, ArbiterError> {
        if self.requestor_locks.len() >= Self::MAX_REQUESTOR_LOCKS
            && !self.requestor_locks.contains_key(&requestor)
        {
            return Err(ArbiterError::Busy(
                "too many concurrent requestors, try again later".to_string(),
            ));
        }
        Ok(self
            .requestor_locks
            .entry(requestor)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn sign_response(
        &self,
        response: ArbiterResponse,
    ) -> Result<Signed<ArbiterResponse>, ArbiterError> {
        Signed::sign(response, &self.signer, self.config())
    }
}

/// How a batch left [`ForcePaymentArbiter::run`].
enum Resolution {
    Stopped(Verdict),
    Settled {
        outcome: Outcome,
        provider_copy: Signed<ArbiterResponse>,
    },
}

impl<L: DepositLedger> ForcePaymentArbiter<L> {
    /// Run validation stages 1–5 without touching the ledger.
    pub fn validate(&self, batch: &ForcePayment, now: u64) -> Result<Validation, ArbiterError> {
        self.validator.validate(batch, now, self.settled.as_ref())
    }

    /// Settle a bare batch and notify both parties on success.
    pub async fn settle(&self, batch: &ForcePayment, now: u64) -> Result<Outcome, ArbiterError> {
        Ok(match self.run(batch, None, now).await? {
            Resolution::Stopped(verdict) => verdict.into(),
            Resolution::Settled { outcome, .. } => outcome,
        })
    }

    /// Handle a signed force-payment request and produce the signed response
    /// for the submitting provider.
    ///
    /// `Err` is returned only for infrastructure failures; check
    /// [`ArbiterError::is_retryable`] before resubmitting.
    pub async fn handle(
        &self,
        request: &Signed<ForcePayment>,
        now: u64,
    ) -> Result<Signed<ArbiterResponse>, ArbiterError> {
        let verdict = match self.run(&request.payload, Some(request), now).await? {
            Resolution::Settled { provider_copy, .. } => return Ok(provider_copy),
            Resolution::Stopped(verdict) => verdict,
        };

        let request_digest = request.signing_hash(self.config());
        let response = match verdict {
            Verdict::Refused(reason) => ArbiterResponse::ServiceRefused(ServiceRefused {
                reason,
                request_digest,
            }),
            Verdict::Rejected(reason) => {
                ArbiterResponse::ForcePaymentRejected(ForcePaymentRejected {
                    reason,
                    request_digest,
                })
            }
        };
        self.sign_response(response)
    }

    pub async fn health_check(&self) -> Result<u64, ArbiterError> {
        self.ledger.health_check().await
    }

    async fn run(
        &self,
        batch: &ForcePayment,
        request: Option<&Signed<ForcePayment>>,
        now: u64,
    ) -> Result<Resolution, ArbiterError> {
        let settled = self.settled.as_ref();
        let validate = || match request {
            Some(request) => self.validator.validate_request(request, now, settled),
            None => self.validator.validate(batch, now, settled),
        };

        // Cheap rejection before taking any lock.
        let requestor = match validate()? {
            Ok(v) => v.requestor_payment_address,
            Err(verdict) => return Ok(Resolution::Stopped(verdict)),
        };

        let lock = self.requestor_lock(requestor)?;
        let _guard = lock.lock().await;

        // Re-validate under the lock: a concurrent settlement may have paid
        // some of these claims in the meantime.
        let validated = match validate()? {
            Ok(v) => v,
            Err(verdict) => {
                tracing::info!(requestor = %requestor, "force payment no longer valid after re-validation");
                return Ok(Resolution::Stopped(verdict));
            }
        };

        let balance = self
            .ledger
            .balance_of(validated.requestor_payment_address)
            .await
            .inspect_err(|e| tracing::error!(requestor = %requestor, error = %e, "deposit balance query failed"))?;
        let amount_paid = balance.min(validated.total);
        let amount_pending = match self.config().pending_policy {
            PendingPolicy::Untracked => U256::ZERO,
            PendingPolicy::Shortfall => validated.total - amount_paid,
        };

        if amount_paid.is_zero() {
            // Nothing moved, so nothing is recorded: the claims stay collectable
            // once the requestor tops up the deposit.
            tracing::warn!(
                requestor = %requestor,
                owed = %validated.total,
                "requestor deposit is empty, settling with zero payment"
            );
        } else {
            self.pay(&validated, amount_paid, now).await?;
            tracing::info!(
                requestor = %requestor,
                provider = %validated.provider_payment_address,
                amount_paid = %amount_paid,
                amount_pending = %amount_pending,
                owed = %validated.total,
                "forced payment committed"
            );
        }

        let provider_copy = self
            .notifier
            .notify(&validated, amount_paid, amount_pending)?;

        Ok(Resolution::Settled {
            outcome: Outcome::Settled {
                amount_paid,
                amount_pending,
                settled_at: validated.settled_at,
            },
            provider_copy,
        })
    }

    /// Record the batch's claims, then transfer. The record is released only
    /// when the ledger reports that nothing moved; an unconfirmed transfer
    /// keeps the claims recorded so they cannot be paid a second time.
    async fn pay(
        &self,
        validated: &ValidatedBatch,
        amount: U256,
        now: u64,
    ) -> Result<(), ArbiterError> {
        let requestor = validated.requestor_payment_address;
        self.settled
            .record_all(&validated.unsettled, now)
            .inspect_err(|e| {
                tracing::error!(
                    requestor = %requestor,
                    claims = validated.unsettled.len(),
                    error = %e,
                    "failed to record claims, transfer not attempted"
                )
            })?;

        let result = self
            .ledger
            .transfer(
                requestor,
                validated.provider_payment_address,
                amount,
                validated.settled_at,
            )
            .await;

        match result {
            Ok(receipt) => {
                tracing::debug!(requestor = %requestor, tx = ?receipt.transaction, "transfer confirmed");
                Ok(())
            }
            Err(e @ ArbiterError::TransferOutcomeUnknown { .. }) => {
                tracing::error!(
                    requestor = %requestor,
                    amount = %amount,
                    error = %e,
                    "forced transfer unconfirmed, claims stay recorded"
                );
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    requestor = %requestor,
                    amount = %amount,
                    error = %e,
                    "forced transfer failed, releasing claims"
                );
                if let Err(release) = self.settled.release_all(&validated.unsettled) {
                    tracing::error!(
                        requestor = %requestor,
                        claims = validated.unsettled.len(),
                        error = %release,
                        "failed to release claims after failed transfer"
                    );
                    return Err(ArbiterError::NeedsReconciliation(format!(
                        "transfer failed ({e}) and {} claims stay recorded: {release}",
                        validated.unsettled.len()
                    )));
                }
                Err(e)
            }
        }
    }
}
