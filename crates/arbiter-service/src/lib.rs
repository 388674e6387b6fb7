//! HTTP front end for the force-payment arbiter.
//!
//! Providers submit signed claim batches to `POST /force-payment`; both
//! parties collect the signed outcome via webhook or `POST /receive`.
//! Validation and settlement live in the core [`arbiter`] crate; this crate
//! provides configuration, state wiring, routes and metrics.
//!
//! # Modules
//!
//! - [`config`]: environment configuration with redacted `Debug`
//! - [`bootstrap`]: production [`AppState`](state::AppState) construction
//! - [`routes`]: health, info, force-payment, receive, metrics
//! - [`webhook`]: HMAC-signed webhook delivery with mailbox fallback
//! - [`metrics`]: Prometheus counters and histograms

pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod webhook;
