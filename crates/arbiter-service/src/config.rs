use std::collections::HashMap;
use std::env;

use alloy::primitives::Address;
use arbiter::{ArbiterConfig, PendingPolicy};
use url::Url;

const DEFAULT_PORT: u16 = 4030;
const DEFAULT_SETTLED_DB_PATH: &str = "./arbiter-settled.db";
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

#[derive(Clone)]
pub struct ServiceConfig {
    /// Arbiter signing key (hex). Also pays gas for forced transfers.
    pub private_key: String,
    /// Deposit contract holding requestor collateral
    pub deposit_contract: Address,
    pub rpc_url: String,
    pub chain_id: u64,
    pub payment_grace_period_secs: u64,
    pub pending_policy: PendingPolicy,
    /// SQLite database of settled claim ids
    pub settled_db_path: String,
    pub port: u16,
    /// Rate limit requests per minute per IP
    pub rate_limit_rpm: u64,
    /// CORS allowed origins (empty = localhost only)
    pub allowed_origins: Vec<String>,
    /// Per-recipient webhook endpoints; recipients without one use the mailbox
    pub recipient_webhooks: HashMap<Address, String>,
    /// Shared secret for signing webhook bodies
    pub webhook_secret: Option<Vec<u8>>,
    /// Bearer token required for /metrics
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured
    pub public_metrics: bool,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("private_key", &"[REDACTED]")
            .field("deposit_contract", &self.deposit_contract)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("payment_grace_period_secs", &self.payment_grace_period_secs)
            .field("pending_policy", &self.pending_policy)
            .field("settled_db_path", &self.settled_db_path)
            .field("port", &self.port)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("allowed_origins", &self.allowed_origins)
            .field("recipient_webhooks", &self.recipient_webhooks)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: arbiter key and deposit contract
        let private_key = env::var("ARBITER_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingRequired("ARBITER_PRIVATE_KEY"))?;

        let contract_str = env::var("DEPOSIT_CONTRACT")
            .map_err(|_| ConfigError::MissingRequired("DEPOSIT_CONTRACT"))?;
        let deposit_contract: Address = contract_str
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(contract_str))?;

        let rpc_url = env::var("RPC_URL").unwrap_or_else(|_| arbiter::RPC_URL.to_string());
        Url::parse(&rpc_url).map_err(|_| ConfigError::InvalidUrl(rpc_url.clone()))?;

        let chain_id = parse_or("CHAIN_ID", arbiter::DEFAULT_CHAIN_ID)?;
        let payment_grace_period_secs = parse_or(
            "PAYMENT_GRACE_PERIOD_SECS",
            arbiter::DEFAULT_PAYMENT_GRACE_PERIOD_SECS,
        )?;

        let pending_policy = match env::var("PENDING_POLICY") {
            Ok(s) => PendingPolicy::parse(&s).ok_or_else(|| ConfigError::InvalidValue {
                var: "PENDING_POLICY",
                value: s,
            })?,
            Err(_) => arbiter::DEFAULT_PENDING_POLICY,
        };

        let settled_db_path =
            env::var("SETTLED_DB_PATH").unwrap_or_else(|_| DEFAULT_SETTLED_DB_PATH.to_string());

        let port = parse_or("PORT", DEFAULT_PORT)?;
        let rate_limit_rpm = parse_or("RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM)?;

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .map(|s| split_list(&s))
            .unwrap_or_default();
        if allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidUrl(
                "wildcard CORS origin '*' is not allowed".to_string(),
            ));
        }

        let recipient_webhooks = match env::var("RECIPIENT_WEBHOOKS") {
            Ok(s) => parse_recipient_webhooks(&s)?,
            Err(_) => HashMap::new(),
        };

        let webhook_secret = env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        if let Some(ref secret) = webhook_secret {
            if secret.len() < 32 {
                tracing::warn!(
                    "WEBHOOK_SECRET is only {} bytes (minimum 32 recommended), \
                     use `openssl rand -hex 32` to generate one",
                    secret.len()
                );
            }
        } else if !recipient_webhooks.is_empty() {
            return Err(ConfigError::MissingRequired("WEBHOOK_SECRET"));
        }

        let metrics_token = env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());
        let public_metrics = env::var("ARBITER_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if metrics_token.is_none() && !public_metrics {
            tracing::warn!("METRICS_TOKEN not set, /metrics will answer 403");
        }

        Ok(Self {
            private_key,
            deposit_contract,
            rpc_url,
            chain_id,
            payment_grace_period_secs,
            pending_policy,
            settled_db_path,
            port,
            rate_limit_rpm,
            allowed_origins,
            recipient_webhooks,
            webhook_secret,
            metrics_token,
            public_metrics,
        })
    }

    /// Core arbiter settings derived from this service config.
    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            chain_id: self.chain_id,
            network: format!("eip155:{}", self.chain_id),
            rpc_url: self.rpc_url.clone(),
            ..ArbiterConfig::default()
        }
        .with_deposit_contract(self.deposit_contract)
        .with_grace_period(self.payment_grace_period_secs)
        .with_pending_policy(self.pending_policy)
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(s) => s
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: s }),
        Err(_) => Ok(default),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `0xADDR=https://host/path,0xADDR2=https://...` into a recipient map.
pub fn parse_recipient_webhooks(s: &str) -> Result<HashMap<Address, String>, ConfigError> {
    let mut map = HashMap::new();
    for entry in split_list(s) {
        let (addr, url) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidValue {
                var: "RECIPIENT_WEBHOOKS",
                value: entry.clone(),
            })?;
        let recipient: Address = addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))?;
        map.insert(recipient, url.trim().to_string());
    }
    Ok(map)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}
