//! Vendora Wallet Core
//!
//! Pure domain model for the vendor wallet & payout ledger.
//!
//! # Invariants
//!
//! - Money conservation: every balance mutation is exactly one delta
//!   paired with exactly one immutable [`types::LedgerEntry`]
//! - Balances never go negative; amounts are exact decimals (2 dp)
//! - Payouts move only PENDING → PROCESSING → COMPLETED | FAILED
//! - Dispute refunds use commission rates frozen at sale time
//!
//! All I/O lives in `wallet-engine`; this crate is synchronous and
//! store-agnostic so the arithmetic can be tested exhaustively.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod dispute;
pub mod error;
pub mod payout;
pub mod types;

// Re-exports
pub use dispute::{
    build_refund_plan, Dispute, DisputeStatus, OrderItemSnapshot, OrderSnapshot, RefundPlan,
    VendorRefund,
};
pub use error::{Error, Result};
pub use payout::{Payout, PayoutStatus};
pub use types::{
    BankDetails, EntryDetail, EntryKind, LedgerEntry, LedgerOp, OrderRef, VendorId, Wallet,
    MONEY_SCALE,
};
