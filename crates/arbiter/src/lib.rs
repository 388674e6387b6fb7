//! Force-payment arbiter for a decentralized compute marketplace.
//!
//! When a requestor does not pay for work it has accepted, the provider submits
//! a batch of signed acceptances. The arbiter verifies the claim chain, checks
//! that every claim is past its payment grace period, and pays the provider out
//! of the requestor's on-chain deposit, notifying both parties.
//!
//! # Claim chain
//!
//! - **Work commitment** ([`WorkCommitment`]): signed by the requestor's payment key
//! - **Work report** ([`WorkReport`]): signed by the provider, embeds the commitment
//! - **Acceptance** ([`Acceptance`]): signed by the requestor, embeds the report
//!
//! # Quick example
//!
//! ```no_run
//! use alloy::signers::local::PrivateKeySigner;
//! use arbiter::{ArbiterConfig, ForcePaymentArbiter, InMemoryLedger, Mailbox};
//! use std::sync::Arc;
//!
//! # async fn run(request: arbiter::Signed<arbiter::ForcePayment>) {
//! let arbiter = ForcePaymentArbiter::new(
//!     PrivateKeySigner::random(),
//!     InMemoryLedger::new(),
//!     Arc::new(Mailbox::new()),
//!     ArbiterConfig::default(),
//! );
//! let response = arbiter.handle(&request, arbiter::unix_now()).await.unwrap();
//! # }
//! ```

// Core types
pub mod claim;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod response;

// Decision pipeline
pub mod force_payment;
pub mod eip712;
pub mod validator;

// External collaborators
pub mod deposit;
pub mod hmac;
pub mod ledger;
pub mod notifier;
pub mod security;
pub mod settled_store;

use alloy::sol;

// EIP-712 structs for every signed message kind.
// Nested messages bind the inner message's signing hash and signature bytes.
sol! {
    #[derive(Debug)]
    struct WorkCommitmentData {
        bytes32 taskId;
        bytes32 subtaskId;
        uint256 price;
        address providerId;
        address providerPaymentAddress;
        address requestorId;
        address requestorPaymentAddress;
    }

    #[derive(Debug)]
    struct WorkReportData {
        bytes32 commitmentHash;
        bytes commitmentSignature;
        bytes32 resultHash;
        uint64 size;
    }

    #[derive(Debug)]
    struct AcceptanceData {
        bytes32 reportHash;
        bytes reportSignature;
        uint64 acceptanceTime;
    }

    #[derive(Debug)]
    struct ForcePaymentData {
        bytes32[] acceptanceHashes;
    }

    #[derive(Debug)]
    struct ForcePaymentCommittedData {
        uint64 paymentTs;
        address requestorId;
        address providerPaymentAddress;
        uint256 amountPaid;
        uint256 amountPending;
        uint8 recipient;
    }

    #[derive(Debug)]
    struct VerdictData {
        uint8 kind;
        uint8 reason;
        bytes32 requestDigest;
    }

    #[derive(Debug)]
    struct ReceiveRequestData {
        address recipient;
        uint64 issuedAt;
    }
}

// Deposit contract interface used for forced payments.
sol! {
    #[sol(rpc)]
    interface ForcePaymentDeposit {
        function balanceOf(address owner) external view returns (uint256);
        function reimburseForNoPayment(address requestor, address provider, uint256 amount, uint256 closureTime) external returns (bool);
    }
}

// Re-exports
pub use force_payment::{unix_now, ForcePaymentArbiter};
pub use claim::*;
pub use constants::*;
pub use envelope::{verify, Signable, Signed, SignedMessage};
pub use error::ArbiterError;
pub use ledger::{DepositLedger, InMemoryLedger, TransferReceipt};
pub use notifier::{Mailbox, NotificationChannel, SettlementNotifier};
pub use response::*;
pub use settled_store::{InMemorySettledStore, SettledClaimStore};
pub use validator::{ClaimValidator, ValidatedBatch, Validation, Verdict};
