//! Webhook delivery of signed settlement outcomes.
//!
//! Recipients with a registered endpoint get an HMAC-signed POST; everyone
//! else is served from the mailbox via `POST /receive`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use arbiter::{ArbiterError, ArbiterResponse, Mailbox, NotificationChannel, Signed};
use serde::Serialize;
use url::Url;

use crate::metrics;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Arbiter-Signature";

/// Purpose label for deriving the webhook signing key from the shared secret.
pub const WEBHOOK_KEY_PURPOSE: &str = "arbiter-webhook-hmac";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementWebhook {
    pub event: String,
    pub recipient: Address,
    pub message: Signed<ArbiterResponse>,
    pub timestamp: u64,
}

/// Validate that every webhook URL parses and uses HTTPS. Called at startup.
pub fn validate_webhook_urls<'a>(urls: impl IntoIterator<Item = &'a String>) -> Result<(), String> {
    for url in urls {
        let parsed = Url::parse(url).map_err(|_| format!("invalid webhook URL: {url}"))?;
        if parsed.scheme() != "https" {
            return Err(format!("webhook URL must use HTTPS: {url}"));
        }
        if parsed.host_str().is_none() {
            return Err(format!("webhook URL has no host: {url}"));
        }
    }
    Ok(())
}

/// HTTP client for webhook delivery. Redirects are never followed.
pub fn webhook_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Notification channel that POSTs to per-recipient webhooks and falls back
/// to the mailbox for recipients without one.
///
/// Receivers check the `X-Arbiter-Signature` header with
/// [`arbiter::hmac::verify_hmac`] over the raw body, keyed by
/// `derive_key(secret, WEBHOOK_KEY_PURPOSE)`.
pub struct WebhookChannel {
    client: reqwest::Client,
    endpoints: HashMap<Address, String>,
    hmac_key: Vec<u8>,
    fallback: Arc<Mailbox>,
    failures: Arc<AtomicU64>,
}

impl WebhookChannel {
    /// `secret` is the operator's shared secret; the signing key is derived from it.
    pub fn new(
        client: reqwest::Client,
        endpoints: HashMap<Address, String>,
        secret: &[u8],
        fallback: Arc<Mailbox>,
    ) -> Self {
        Self {
            client,
            endpoints,
            hmac_key: arbiter::hmac::derive_key(secret, WEBHOOK_KEY_PURPOSE),
            fallback,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn endpoint(&self, recipient: Address) -> Option<&str> {
        self.endpoints.get(&recipient).map(String::as_str)
    }

    fn mailbox(
        &self,
        recipient: Address,
        message: Signed<ArbiterResponse>,
    ) -> Result<(), ArbiterError> {
        metrics::NOTIFICATIONS.with_label_values(&["mailbox"]).inc();
        self.fallback.deliver(recipient, message)
    }
}

impl NotificationChannel for WebhookChannel {
    fn deliver(
        &self,
        recipient: Address,
        message: Signed<ArbiterResponse>,
    ) -> Result<(), ArbiterError> {
        let Some(url) = self.endpoints.get(&recipient) else {
            return self.mailbox(recipient, message);
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(recipient = %recipient, "no async runtime, queueing webhook message in mailbox");
            return self.mailbox(recipient, message);
        };

        let webhook = SettlementWebhook {
            event: "force_payment.committed".to_string(),
            recipient,
            message,
            timestamp: arbiter::unix_now(),
        };
        let body = serde_json::to_vec(&webhook)?;
        let signature = arbiter::hmac::compute_hmac(&self.hmac_key, &body);

        let client = self.client.clone();
        let url = url.clone();
        let fallback = Arc::clone(&self.fallback);
        let failures = Arc::clone(&self.failures);
        let message = webhook.message;

        runtime.spawn(async move {
            let result = client
                .post(&url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(body)
                .send()
                .await;
            let failure = match result {
                Ok(resp) if resp.status().is_success() => {
                    metrics::NOTIFICATIONS.with_label_values(&["webhook"]).inc();
                    tracing::debug!(url = %url, status = %resp.status(), "webhook delivered");
                    return;
                }
                Ok(resp) => format!("status {}", resp.status()),
                Err(e) => e.to_string(),
            };

            failures.fetch_add(1, Ordering::Relaxed);
            metrics::NOTIFICATIONS.with_label_values(&["webhook_failed"]).inc();
            tracing::warn!(url = %url, error = %failure, "webhook delivery failed, queueing in mailbox");
            match fallback.deliver(recipient, message) {
                Ok(()) => {
                    metrics::NOTIFICATIONS.with_label_values(&["mailbox"]).inc();
                }
                Err(e) => {
                    tracing::error!(recipient = %recipient, error = %e, "mailbox fallback failed, message lost");
                }
            }
        });
        Ok(())
    }

    fn failed_deliveries(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
