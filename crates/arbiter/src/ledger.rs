//! Deposit ledger interface.
//!
//! The ledger is external, possibly slow, and possibly racy. A transfer that
//! exceeds the balance at execution time fails atomically with a retryable
//! error; it never partially applies.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, U256};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ArbiterError;

/// Proof that a forced transfer committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    /// Transaction hash for on-chain ledgers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

/// Balance query and bounded transfer against requestor deposits.
pub trait DepositLedger: Send + Sync {
    /// Collateral currently available in `owner`'s deposit.
    fn balance_of(
        &self,
        owner: Address,
    ) -> impl Future<Output = Result<U256, ArbiterError>> + Send;

    /// Move `amount` from `from`'s deposit to `to`. `closure_time` is the
    /// latest acceptance time covered by the payment.
    ///
    /// A retryable error means nothing moved. When the ledger cannot tell
    /// whether the transfer applied it returns
    /// [`ArbiterError::TransferOutcomeUnknown`].
    fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        closure_time: u64,
    ) -> impl Future<Output = Result<TransferReceipt, ArbiterError>> + Send;

    /// Connectivity check; returns the ledger's current height.
    fn health_check(&self) -> impl Future<Output = Result<u64, ArbiterError>> + Send;
}

/// In-process ledger for tests and local runs.
pub struct InMemoryLedger {
    deposits: DashMap<Address, U256>,
    credited: DashMap<Address, U256>,
    transfers: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            deposits: DashMap::new(),
            credited: DashMap::new(),
            transfers: AtomicU64::new(0),
        }
    }

    /// Add `amount` to `owner`'s deposit.
    pub fn deposit(&self, owner: Address, amount: U256) {
        let mut entry = self.deposits.entry(owner).or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn deposit_of(&self, owner: Address) -> U256 {
        self.deposits.get(&owner).map(|b| *b).unwrap_or(U256::ZERO)
    }

    /// Total received by `recipient` through forced transfers.
    pub fn credited_to(&self, recipient: Address) -> U256 {
        self.credited
            .get(&recipient)
            .map(|b| *b)
            .unwrap_or(U256::ZERO)
    }

    pub fn transfer_count(&self) -> u64 {
        self.transfers.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl DepositLedger for InMemoryLedger {
    async fn balance_of(&self, owner: Address) -> Result<U256, ArbiterError> {
        Ok(self.deposit_of(owner))
    }

    async fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        _closure_time: u64,
    ) -> Result<TransferReceipt, ArbiterError> {
        // Check and debit under the entry lock so a concurrent debit cannot
        // slip between them.
        match self.deposits.entry(from) {
            Entry::Occupied(mut e) if *e.get() >= amount => {
                *e.get_mut() -= amount;
            }
            Entry::Occupied(e) => {
                return Err(ArbiterError::InsufficientDeposit {
                    available: *e.get(),
                    requested: amount,
                });
            }
            Entry::Vacant(_) => {
                return Err(ArbiterError::InsufficientDeposit {
                    available: U256::ZERO,
                    requested: amount,
                });
            }
        }

        let mut credited = self.credited.entry(to).or_insert(U256::ZERO);
        *credited = credited.saturating_add(amount);
        drop(credited);
        self.transfers.fetch_add(1, Ordering::SeqCst);

        Ok(TransferReceipt {
            from,
            to,
            amount,
            transaction: None,
        })
    }

    async fn health_check(&self) -> Result<u64, ArbiterError> {
        Ok(self.transfer_count())
    }
}
