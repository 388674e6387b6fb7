use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity, RootProvider,
};
use arbiter::deposit::ContractLedger;
use arbiter::{ForcePaymentArbiter, Mailbox};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// Ledger used by the production binary: the on-chain deposit contract.
pub type ChainLedger = ContractLedger<WalletProvider>;

/// Shared application state, generic over the deposit ledger.
pub struct AppState<L = ChainLedger> {
    pub arbiter: ForcePaymentArbiter<L>,
    /// Messages awaiting pickup via `POST /receive`.
    pub mailbox: Arc<Mailbox>,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics unauthenticated when no token is set.
    pub public_metrics: bool,
}
