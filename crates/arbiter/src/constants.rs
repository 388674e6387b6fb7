use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Default chain ID for the deposit contract (Ethereum mainnet).
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// CAIP-2 network identifier matching [`DEFAULT_CHAIN_ID`].
pub const DEFAULT_NETWORK: &str = "eip155:1";

/// Default RPC endpoint for the deposit chain.
pub const RPC_URL: &str = "http://localhost:8545";

/// EIP-712 domain name shared by every party signing claim messages.
pub const EIP712_DOMAIN_NAME: &str = "force-payment-arbiter";

/// EIP-712 domain version.
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// Minimum time between acceptance and forced settlement of a claim (2 hours).
pub const DEFAULT_PAYMENT_GRACE_PERIOD_SECS: u64 = 2 * 60 * 60;

/// Pending policy used when none is configured. Partial debt is not tracked
/// by the arbiter, so `amount_pending` is always reported as zero.
pub const DEFAULT_PENDING_POLICY: PendingPolicy = PendingPolicy::Untracked;

/// How the unpaid remainder of an underfunded settlement is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// `amount_pending` is always zero; the remainder is not collectable here.
    Untracked,
    /// `amount_pending` is the shortfall `V - amount_paid`.
    Shortfall,
}

impl PendingPolicy {
    /// Parse a policy name (`untracked` or `shortfall`, case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "untracked" => Some(Self::Untracked),
            "shortfall" => Some(Self::Shortfall),
            _ => None,
        }
    }
}

/// Runtime arbiter configuration. Every signature in the claim chain is
/// bound to the EIP-712 domain built from this config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterConfig {
    pub chain_id: u64,
    pub network: String,
    /// Deposit contract holding requestor collateral; also the EIP-712 verifying contract.
    pub deposit_contract: Address,
    pub rpc_url: String,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
    pub payment_grace_period_secs: u64,
    pub pending_policy: PendingPolicy,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            network: DEFAULT_NETWORK.to_string(),
            deposit_contract: Address::ZERO,
            rpc_url: RPC_URL.to_string(),
            eip712_domain_name: EIP712_DOMAIN_NAME.to_string(),
            eip712_domain_version: EIP712_DOMAIN_VERSION.to_string(),
            payment_grace_period_secs: DEFAULT_PAYMENT_GRACE_PERIOD_SECS,
            pending_policy: DEFAULT_PENDING_POLICY,
        }
    }
}

impl ArbiterConfig {
    pub fn with_deposit_contract(mut self, contract: Address) -> Self {
        self.deposit_contract = contract;
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    pub fn with_grace_period(mut self, secs: u64) -> Self {
        self.payment_grace_period_secs = secs;
        self
    }
}
