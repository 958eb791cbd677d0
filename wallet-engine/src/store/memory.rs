//! In-memory ledger store
//!
//! Backs tests and local demos. One mutex guards the whole state, so
//! every trait method is trivially atomic and serialized, matching the
//! row-locking discipline of the Postgres store.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{
    BankDetails, Dispute, DisputeStatus, EntryKind, LedgerEntry, LedgerOp, OrderSnapshot, Payout,
    PayoutStatus, RefundPlan, VendorId, Wallet,
};

use super::LedgerStore;
use crate::{Error, Result};

#[derive(Default)]
struct State {
    wallets: HashMap<VendorId, Wallet>,
    entries: Vec<LedgerEntry>,
    payouts: HashMap<Uuid, Payout>,
    orders: HashMap<Uuid, OrderSnapshot>,
    disputes: HashMap<Uuid, Dispute>,
    resolutions: HashMap<Uuid, RefundPlan>,
}

/// Mutex-guarded in-memory store
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<State>>,
}

impl MemoryLedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order snapshot (test fixture)
    pub fn put_order_snapshot(&self, order: OrderSnapshot) {
        self.state.lock().orders.insert(order.order_id, order);
    }

    /// Seed an open dispute (test fixture)
    pub fn open_dispute(&self, order_id: Uuid, reason: impl Into<String>) -> Dispute {
        let dispute = Dispute::open(order_id, reason);
        self.state
            .lock()
            .disputes
            .insert(dispute.id, dispute.clone());
        dispute
    }

    /// Stored refund plan for a resolved dispute, if any
    pub fn resolution_plan(&self, dispute_id: Uuid) -> Option<RefundPlan> {
        self.state.lock().resolutions.get(&dispute_id).cloned()
    }

    fn wallet_entry<'a>(state: &'a mut State, vendor_id: VendorId) -> &'a mut Wallet {
        state
            .wallets
            .entry(vendor_id)
            .or_insert_with(|| Wallet::new(vendor_id))
    }
}

impl std::fmt::Debug for MemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedgerStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn apply_wallet_op(
        &self,
        vendor_id: VendorId,
        op: LedgerOp,
    ) -> Result<(Wallet, LedgerEntry)> {
        let mut state = self.state.lock();

        if let LedgerOp::Release { order_ref, .. } = &op {
            let wallet_id = state
                .wallets
                .get(&vendor_id)
                .map(|w| w.id)
                .ok_or_else(|| wallet_core::Error::not_found("wallet", vendor_id))?;
            let commissioned = state.entries.iter().any(|entry| {
                entry.wallet_id == wallet_id
                    && entry.kind == EntryKind::Commission
                    && entry.detail.order_ref() == Some(order_ref)
            });
            if !commissioned {
                return Err(Error::Ledger(wallet_core::Error::InvalidState(format!(
                    "no commission recorded for order {} before release",
                    order_ref
                ))));
            }
        }

        let wallet = Self::wallet_entry(&mut state, vendor_id);
        let entry = wallet.apply(&op).map_err(Error::Ledger)?;
        let snapshot = wallet.clone();
        state.entries.push(entry.clone());
        Ok((snapshot, entry))
    }

    async fn get_wallet(&self, vendor_id: VendorId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().wallets.get(&vendor_id).cloned())
    }

    async fn list_entries(&self, vendor_id: VendorId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock();
        let Some(wallet) = state.wallets.get(&vendor_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .entries
            .iter()
            .filter(|e| e.wallet_id == wallet.id)
            .cloned()
            .collect())
    }

    async fn create_payout(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<Payout> {
        let mut state = self.state.lock();
        let wallet = Self::wallet_entry(&mut state, vendor_id).clone();

        let has_pending = state
            .payouts
            .values()
            .any(|p| p.wallet_id == wallet.id && p.status == PayoutStatus::Pending);
        if has_pending {
            return Err(Error::Ledger(wallet_core::Error::Conflict(format!(
                "wallet {} already has a pending payout",
                wallet.id
            ))));
        }
        if amount > wallet.available_balance {
            return Err(Error::Ledger(wallet_core::Error::InsufficientBalance {
                requested: amount,
                available: wallet.available_balance,
            }));
        }

        let payout = Payout::new(wallet.id, amount, bank);
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.state
            .lock()
            .payouts
            .get(&payout_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))
    }

    async fn list_payouts(&self, vendor_id: VendorId) -> Result<Vec<Payout>> {
        let state = self.state.lock();
        let Some(wallet) = state.wallets.get(&vendor_id) else {
            return Ok(Vec::new());
        };
        let mut payouts: Vec<Payout> = state
            .payouts
            .values()
            .filter(|p| p.wallet_id == wallet.id)
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(payouts)
    }

    async fn process_payout(&self, payout_id: Uuid) -> Result<(Payout, Wallet)> {
        let mut state = self.state.lock();

        let mut payout = state
            .payouts
            .get(&payout_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;
        payout.begin_processing().map_err(Error::Ledger)?;

        // re-read the wallet under the lock; the balance may have
        // moved since the request was filed
        let wallet = state
            .wallets
            .values_mut()
            .find(|w| w.id == payout.wallet_id)
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("wallet", payout.wallet_id)))?;
        let entry = wallet
            .apply(&LedgerOp::PayoutDebit {
                amount: payout.amount,
                payout_id: payout.id,
                bank: payout.bank.clone(),
            })
            .map_err(Error::Ledger)?;
        let wallet = wallet.clone();

        state.entries.push(entry);
        state.payouts.insert(payout.id, payout.clone());
        Ok((payout, wallet))
    }

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        transaction_ref: &str,
    ) -> Result<(Payout, Wallet)> {
        let mut state = self.state.lock();

        let mut payout = state
            .payouts
            .get(&payout_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;
        payout.complete(transaction_ref).map_err(Error::Ledger)?;

        let wallet = state
            .wallets
            .values_mut()
            .find(|w| w.id == payout.wallet_id)
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("wallet", payout.wallet_id)))?;
        wallet.total_withdrawn += payout.amount;
        wallet.updated_at = chrono::Utc::now();
        let wallet = wallet.clone();

        state.payouts.insert(payout.id, payout.clone());
        Ok((payout, wallet))
    }

    async fn fail_payout(&self, payout_id: Uuid, reason: &str) -> Result<(Payout, Wallet)> {
        let mut state = self.state.lock();

        let mut payout = state
            .payouts
            .get(&payout_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;
        payout.fail(reason).map_err(Error::Ledger)?;

        let wallet = state
            .wallets
            .values_mut()
            .find(|w| w.id == payout.wallet_id)
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("wallet", payout.wallet_id)))?;
        let entry = wallet
            .apply(&LedgerOp::PayoutReversal {
                amount: payout.amount,
                payout_id: payout.id,
                reason: reason.to_string(),
            })
            .map_err(Error::Ledger)?;
        let wallet = wallet.clone();

        state.entries.push(entry);
        state.payouts.insert(payout.id, payout.clone());
        Ok((payout, wallet))
    }

    async fn cancel_payout(&self, payout_id: Uuid, vendor_id: VendorId) -> Result<Payout> {
        let mut state = self.state.lock();

        let payout = state
            .payouts
            .get(&payout_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;

        let owns = state
            .wallets
            .get(&vendor_id)
            .map(|w| w.id == payout.wallet_id)
            .unwrap_or(false);
        if !owns {
            return Err(Error::Ledger(wallet_core::Error::Validation(format!(
                "payout {} is not owned by vendor {}",
                payout_id, vendor_id
            ))));
        }
        payout.ensure_cancellable().map_err(Error::Ledger)?;

        state.payouts.remove(&payout_id);
        Ok(payout)
    }

    async fn get_order_snapshot(&self, order_id: Uuid) -> Result<OrderSnapshot> {
        self.state
            .lock()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("order", order_id)))
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute> {
        self.state
            .lock()
            .disputes
            .get(&dispute_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", dispute_id)))
    }

    async fn get_dispute_by_order(&self, order_id: Uuid) -> Result<Dispute> {
        self.state
            .lock()
            .disputes
            .values()
            .find(|d| d.order_id == order_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", order_id)))
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        admin_notes: &str,
        plan: Option<&RefundPlan>,
    ) -> Result<Dispute> {
        let mut state = self.state.lock();

        let dispute = state
            .disputes
            .get_mut(&dispute_id)
            .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", dispute_id)))?;
        dispute.resolve(status, admin_notes).map_err(Error::Ledger)?;
        let resolved = dispute.clone();

        if let Some(plan) = plan {
            state.resolutions.insert(dispute_id, plan.clone());
        }
        Ok(resolved)
    }
}
