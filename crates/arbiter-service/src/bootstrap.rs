//! Build the production [`AppState`] from a [`ServiceConfig`].

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use arbiter::deposit::ContractLedger;
use arbiter::settled_store::SqliteSettledStore;
use arbiter::{ForcePaymentArbiter, Mailbox, NotificationChannel, SettledClaimStore};

use crate::config::ServiceConfig;
use crate::state::{AppState, ChainLedger};
use crate::webhook::{self, WebhookChannel};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid ARBITER_PRIVATE_KEY")]
    InvalidKey,

    #[error("invalid RPC_URL: {0}")]
    InvalidRpcUrl(String),

    #[error("failed to open settled-claim store at {path}: {reason}")]
    SettledStore { path: String, reason: String },

    #[error("invalid webhook configuration: {0}")]
    Webhook(String),
}

/// Parse the key, connect the ledger, open the SQLite settled-claim store
/// and wire notification delivery.
///
/// There is no in-memory fallback for the settled-claim store: losing it on
/// restart would let every recently settled batch be paid a second time.
pub fn bootstrap(config: &ServiceConfig) -> Result<AppState<ChainLedger>, BootstrapError> {
    let signer: PrivateKeySigner = config
        .private_key
        .trim()
        .parse()
        .map_err(|_| BootstrapError::InvalidKey)?;
    let arbiter_address = signer.address();

    let rpc_url: url::Url = config
        .rpc_url
        .parse()
        .map_err(|_| BootstrapError::InvalidRpcUrl(config.rpc_url.clone()))?;
    let provider = ProviderBuilder::new()
        .wallet(alloy::network::EthereumWallet::from(signer.clone()))
        .connect_http(rpc_url);
    let ledger = ContractLedger::new(provider, config.deposit_contract);

    let settled: Arc<dyn SettledClaimStore> =
        match SqliteSettledStore::open(&config.settled_db_path) {
            Ok(store) => {
                tracing::info!("Settled-claim store: SQLite at {}", config.settled_db_path);
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to open SQLite settled-claim store at {}: {e}",
                    config.settled_db_path
                );
                return Err(BootstrapError::SettledStore {
                    path: config.settled_db_path.clone(),
                    reason: e.to_string(),
                });
            }
        };

    let mailbox = Arc::new(Mailbox::new());
    let channel: Arc<dyn NotificationChannel> = if config.recipient_webhooks.is_empty() {
        mailbox.clone()
    } else {
        webhook::validate_webhook_urls(config.recipient_webhooks.values())
            .map_err(BootstrapError::Webhook)?;
        let secret = config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| BootstrapError::Webhook("WEBHOOK_SECRET is required".to_string()))?;
        let client = webhook::webhook_client().map_err(|e| BootstrapError::Webhook(e.to_string()))?;
        tracing::info!("Webhook endpoints configured: {}", config.recipient_webhooks.len());
        Arc::new(WebhookChannel::new(
            client,
            config.recipient_webhooks.clone(),
            secret,
            mailbox.clone(),
        ))
    };

    let arbiter = ForcePaymentArbiter::new(signer, ledger, channel, config.arbiter_config())
        .with_settled_store(settled);
    arbiter.start_lock_cleanup();

    tracing::info!("Arbiter address: {arbiter_address}");
    tracing::info!("Deposit contract: {}", config.deposit_contract);

    Ok(AppState {
        arbiter,
        mailbox,
        metrics_token: config.metrics_token.clone(),
        public_metrics: config.public_metrics,
    })
}
