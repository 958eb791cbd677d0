//! The transactional seam between the engine and persistence
//!
//! Every method on [`LedgerStore`] is one atomic unit of work. An
//! implementation must re-read rows inside its own transaction scope
//! rather than trusting values fetched earlier; that re-read is the
//! crux of race-safety for two requests hitting the same wallet or
//! payout. Either every effect of a method commits or none does.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;
use wallet_core::{
    BankDetails, Dispute, DisputeStatus, LedgerEntry, LedgerOp, OrderSnapshot, Payout, RefundPlan,
    VendorId, Wallet,
};

use crate::Result;

/// Persistent wallet + payout + dispute records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically load (or lazily create) the vendor's wallet, apply
    /// `op`, and persist the wallet and its audit entry together.
    ///
    /// For a `Release` op the store must verify, inside the same
    /// transaction, that a COMMISSION entry already exists for the
    /// wallet and order reference; releasing gross funds with no
    /// commission deducted is an `InvalidState` error. A release
    /// against a vendor with no wallet yet is `NotFound`, never a
    /// lazy create.
    async fn apply_wallet_op(
        &self,
        vendor_id: VendorId,
        op: LedgerOp,
    ) -> Result<(Wallet, LedgerEntry)>;

    /// Read a vendor's wallet, if it exists yet
    async fn get_wallet(&self, vendor_id: VendorId) -> Result<Option<Wallet>>;

    /// Audit trail for a vendor's wallet, oldest first
    async fn list_entries(&self, vendor_id: VendorId) -> Result<Vec<LedgerEntry>>;

    /// Create a PENDING payout
    ///
    /// One transaction enforcing both preconditions: no other PENDING
    /// payout for the wallet (`Conflict`) and `amount` within the
    /// available balance (`InsufficientBalance`). Balances are not
    /// touched.
    async fn create_payout(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<Payout>;

    /// Read one payout
    async fn get_payout(&self, payout_id: Uuid) -> Result<Payout>;

    /// Payout history for a vendor, newest first
    async fn list_payouts(&self, vendor_id: VendorId) -> Result<Vec<Payout>>;

    /// PENDING → PROCESSING, deducting the available balance and
    /// appending the PAYOUT entry, all in one transaction. The balance
    /// is re-validated against the row read under lock, not any value
    /// the caller saw earlier.
    async fn process_payout(&self, payout_id: Uuid) -> Result<(Payout, Wallet)>;

    /// PROCESSING → COMPLETED, bumping `total_withdrawn`. No balance
    /// change and no ledger entry: the funds left at processing time.
    async fn complete_payout(&self, payout_id: Uuid, transaction_ref: &str)
        -> Result<(Payout, Wallet)>;

    /// PROCESSING → FAILED, crediting the amount back with a CREDIT
    /// entry in the same transaction
    async fn fail_payout(&self, payout_id: Uuid, reason: &str) -> Result<(Payout, Wallet)>;

    /// Delete a PENDING payout owned by `vendor_id`; returns the
    /// deleted row
    async fn cancel_payout(&self, payout_id: Uuid, vendor_id: VendorId) -> Result<Payout>;

    /// Read the frozen order snapshot used for refund calculation
    async fn get_order_snapshot(&self, order_id: Uuid) -> Result<OrderSnapshot>;

    /// Read one dispute
    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute>;

    /// Read the dispute filed against an order
    async fn get_dispute_by_order(&self, order_id: Uuid) -> Result<Dispute>;

    /// Atomically claim a dispute resolution: transitions to `status`
    /// only from OPEN/IN_REVIEW, storing admin notes and the applied
    /// plan. A second concurrent resolution fails with `InvalidState`
    /// here, before any wallet is credited.
    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        admin_notes: &str,
        plan: Option<&RefundPlan>,
    ) -> Result<Dispute>;
}
