//! Vendora Wallet Engine
//!
//! Operational layer for the vendor wallet & payout ledger: the
//! [`WalletLedger`] engine, a transactional [`store::LedgerStore`]
//! seam with Postgres and in-memory implementations, fire-and-forget
//! notification dispatch, and Prometheus metrics.
//!
//! # Atomicity
//!
//! Every money-moving operation is one store transaction: re-read the
//! rows under lock, apply exactly one balance delta, append exactly
//! one audit entry, commit. A crash or a concurrent conflict leaves
//! either all three effects applied or none.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod store;

// Re-exports
pub use config::{DatabaseConfig, LedgerConfig};
pub use engine::{Resolution, WalletLedger};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use notify::{LedgerNotification, NotificationSink, TracingSink};
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
