//! Settlement notification: the two role-tagged outcome copies and the
//! channel they are delivered over.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::envelope::{Signable, Signed, SignedMessage};
use crate::response::{ArbiterResponse, ForcePaymentCommitted, RecipientRole};
use crate::validator::ValidatedBatch;
use crate::{ArbiterConfig, ArbiterError};

/// Maximum age of a signed mailbox pickup request.
pub const RECEIVE_WINDOW_SECS: u64 = 300;

/// Messages kept per recipient before the oldest are dropped.
pub const MAILBOX_CAPACITY: usize = 1024;

/// Outbound channel to marketplace participants.
///
/// Delivery is fire-and-forget from the arbiter's side: implementations must
/// not block, and retry/dedup belongs to the channel.
pub trait NotificationChannel: Send + Sync {
    fn deliver(
        &self,
        recipient: Address,
        message: Signed<ArbiterResponse>,
    ) -> Result<(), ArbiterError>;

    /// Deliveries that failed after `deliver` had already returned `Ok`.
    fn failed_deliveries(&self) -> u64 {
        0
    }
}

/// Signed request to collect queued messages for `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    pub recipient: Address,
    pub issued_at: u64,
}

impl Signable for ReceiveRequest {
    fn message(&self) -> SignedMessage<'_> {
        SignedMessage::Receive(self)
    }
}

/// In-memory per-recipient queue of signed arbiter messages.
pub struct Mailbox {
    queues: DashMap<Address, VecDeque<Signed<ArbiterResponse>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Remove and return everything queued for `recipient`.
    pub fn drain(&self, recipient: Address) -> Vec<Signed<ArbiterResponse>> {
        self.queues
            .remove(&recipient)
            .map(|(_, q)| q.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, recipient: Address) -> usize {
        self.queues.get(&recipient).map(|q| q.len()).unwrap_or(0)
    }

    /// Check that a pickup request is signed by its recipient and fresh.
    pub fn authorize(
        request: &Signed<ReceiveRequest>,
        now: u64,
        config: &ArbiterConfig,
    ) -> bool {
        let issued_at = request.payload.issued_at;
        let fresh = issued_at <= now.saturating_add(30)
            && now.saturating_sub(issued_at) <= RECEIVE_WINDOW_SECS;
        fresh && request.verify(request.payload.recipient, config)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for Mailbox {
    fn deliver(
        &self,
        recipient: Address,
        message: Signed<ArbiterResponse>,
    ) -> Result<(), ArbiterError> {
        let mut queue = self.queues.entry(recipient).or_default();
        if queue.len() >= MAILBOX_CAPACITY {
            queue.pop_front();
            tracing::warn!(recipient = %recipient, "mailbox full, dropped oldest message");
        }
        queue.push_back(message);
        Ok(())
    }
}

/// Builds, signs and delivers the two copies of a committed settlement.
pub struct SettlementNotifier {
    signer: PrivateKeySigner,
    config: ArbiterConfig,
    channel: Arc<dyn NotificationChannel>,
    failures: AtomicU64,
}

impl SettlementNotifier {
    pub fn new(
        signer: PrivateKeySigner,
        config: ArbiterConfig,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            signer,
            config,
            channel,
            failures: AtomicU64::new(0),
        }
    }

    /// Deliveries that failed since startup, synchronous or not.
    pub fn delivery_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed) + self.channel.failed_deliveries()
    }

    /// The provider and requestor copies, identical except for `recipient`.
    pub fn copies(
        batch: &ValidatedBatch,
        amount_paid: U256,
        amount_pending: U256,
    ) -> [ForcePaymentCommitted; 2] {
        let base = ForcePaymentCommitted {
            payment_ts: batch.settled_at,
            requestor_id: batch.requestor_id,
            provider_payment_address: batch.provider_payment_address,
            amount_paid,
            amount_pending,
            recipient: RecipientRole::Provider,
        };
        let requestor_copy = ForcePaymentCommitted {
            recipient: RecipientRole::Requestor,
            ..base.clone()
        };
        [base, requestor_copy]
    }

    /// Sign both copies and deliver each to its party. Returns the provider's
    /// copy. Delivery failures are logged and counted, never returned: the
    /// transfer has committed.
    pub fn notify(
        &self,
        batch: &ValidatedBatch,
        amount_paid: U256,
        amount_pending: U256,
    ) -> Result<Signed<ArbiterResponse>, ArbiterError> {
        let [provider_copy, requestor_copy] = Self::copies(batch, amount_paid, amount_pending);

        let provider_msg = Signed::sign(
            ArbiterResponse::ForcePaymentCommitted(provider_copy),
            &self.signer,
            &self.config,
        )?;
        let requestor_msg = Signed::sign(
            ArbiterResponse::ForcePaymentCommitted(requestor_copy),
            &self.signer,
            &self.config,
        )?;

        for (recipient, role, message) in [
            (batch.provider_id, RecipientRole::Provider, provider_msg.clone()),
            (batch.requestor_id, RecipientRole::Requestor, requestor_msg),
        ] {
            if let Err(e) = self.channel.deliver(recipient, message) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    recipient = %recipient,
                    role = ?role,
                    error = %e,
                    "settlement notification failed, transfer stands"
                );
            }
        }

        Ok(provider_msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> ValidatedBatch {
        ValidatedBatch {
            requestor_id: Address::repeat_byte(0x01),
            requestor_payment_address: Address::repeat_byte(0x02),
            provider_id: Address::repeat_byte(0x03),
            provider_payment_address: Address::repeat_byte(0x04),
            unsettled: vec![],
            total: U256::from(30u64),
            settled_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_copies_differ_only_in_role() {
        let [p, r] = SettlementNotifier::copies(&batch(), U256::from(20u64), U256::from(10u64));
        assert_eq!(p.recipient, RecipientRole::Provider);
        assert_eq!(r.recipient, RecipientRole::Requestor);
        assert_eq!(
            ForcePaymentCommitted {
                recipient: RecipientRole::Provider,
                ..r
            },
            p
        );
    }

    #[test]
    fn test_notify_delivers_to_both_parties() {
        let mailbox = Arc::new(Mailbox::new());
        let config = ArbiterConfig::default();
        let signer = PrivateKeySigner::random();
        let arbiter_address = signer.address();
        let notifier = SettlementNotifier::new(signer, config.clone(), mailbox.clone());

        let b = batch();
        let provider_msg = notifier
            .notify(&b, U256::from(30u64), U256::ZERO)
            .unwrap();
        assert!(provider_msg.verify(arbiter_address, &config));

        let provider_inbox = mailbox.drain(b.provider_id);
        let requestor_inbox = mailbox.drain(b.requestor_id);
        assert_eq!(provider_inbox, vec![provider_msg]);
        assert_eq!(requestor_inbox.len(), 1);
        assert!(requestor_inbox[0].verify(arbiter_address, &config));
        assert_eq!(mailbox.pending(b.provider_id), 0);
        assert_eq!(notifier.delivery_failures(), 0);
    }

    struct ClosedChannel;

    impl NotificationChannel for ClosedChannel {
        fn deliver(
            &self,
            _recipient: Address,
            _message: Signed<ArbiterResponse>,
        ) -> Result<(), ArbiterError> {
            Err(ArbiterError::NotificationError("channel closed".to_string()))
        }
    }

    #[test]
    fn test_delivery_failure_is_counted_not_propagated() {
        let notifier = SettlementNotifier::new(
            PrivateKeySigner::random(),
            ArbiterConfig::default(),
            Arc::new(ClosedChannel),
        );
        let result = notifier.notify(&batch(), U256::from(30u64), U256::ZERO);
        assert!(result.is_ok());
        assert_eq!(notifier.delivery_failures(), 2);
    }

    /// Accepts everything, then reports one later failure.
    struct LossyChannel;

    impl NotificationChannel for LossyChannel {
        fn deliver(
            &self,
            _recipient: Address,
            _message: Signed<ArbiterResponse>,
        ) -> Result<(), ArbiterError> {
            Ok(())
        }

        fn failed_deliveries(&self) -> u64 {
            1
        }
    }

    #[test]
    fn test_deferred_channel_failures_are_counted() {
        let notifier = SettlementNotifier::new(
            PrivateKeySigner::random(),
            ArbiterConfig::default(),
            Arc::new(LossyChannel),
        );
        notifier
            .notify(&batch(), U256::from(30u64), U256::ZERO)
            .unwrap();
        assert_eq!(notifier.delivery_failures(), 1);
    }

    #[test]
    fn test_mailbox_drops_oldest_when_full() {
        let mailbox = Mailbox::new();
        let recipient = Address::repeat_byte(0x05);
        for i in 0..=MAILBOX_CAPACITY {
            let msg = Signed::unsigned(
                ArbiterResponse::ForcePaymentCommitted(ForcePaymentCommitted {
                    payment_ts: i as u64,
                    requestor_id: Address::ZERO,
                    provider_payment_address: Address::ZERO,
                    amount_paid: U256::ZERO,
                    amount_pending: U256::ZERO,
                    recipient: RecipientRole::Provider,
                }),
                Address::ZERO,
            );
            mailbox.deliver(recipient, msg).unwrap();
        }
        let drained = mailbox.drain(recipient);
        assert_eq!(drained.len(), MAILBOX_CAPACITY);
        match &drained[0].payload {
            ArbiterResponse::ForcePaymentCommitted(c) => assert_eq!(c.payment_ts, 1),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_receive_authorization() {
        let config = ArbiterConfig::default();
        let recipient = PrivateKeySigner::random();
        let now = 1_700_000_000;
        let request = Signed::sign(
            ReceiveRequest {
                recipient: recipient.address(),
                issued_at: now - 10,
            },
            &recipient,
            &config,
        )
        .unwrap();
        assert!(Mailbox::authorize(&request, now, &config));
        assert!(!Mailbox::authorize(&request, now + RECEIVE_WINDOW_SECS, &config));

        let impostor = PrivateKeySigner::random();
        let forged = Signed::sign(
            ReceiveRequest {
                recipient: recipient.address(),
                issued_at: now,
            },
            &impostor,
            &config,
        )
        .unwrap();
        assert!(!Mailbox::authorize(&forged, now, &config));
    }
}
