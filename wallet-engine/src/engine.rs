//! The wallet ledger engine
//!
//! High-level operations over the store: holds, commissions, releases,
//! the payout lifecycle, and dispute resolution. Each operation is one
//! atomic store call; on success the engine dispatches a best-effort
//! notification and bumps its metrics. Nothing here ever leaves a
//! wallet partially mutated: either the store commits the whole
//! operation or the error propagates unchanged.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use wallet_core::{
    build_refund_plan, BankDetails, Dispute, DisputeStatus, LedgerEntry, LedgerOp, OrderRef,
    Payout, RefundPlan, VendorId, Wallet,
};

use crate::notify::{payout_notification, LedgerNotification, NotificationSink, TracingSink};
use crate::store::LedgerStore;
use crate::{Error, LedgerConfig, Metrics, Result};

/// How an admin resolves a dispute
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Refund the customer and reverse vendor earnings; an admin may
    /// override the computed total with a partial amount
    CustomerFavor {
        /// Optional admin-entered partial refund, clamped to
        /// `(0, order_total]`
        custom_refund: Option<Decimal>,
    },
    /// No refund; the dispute is closed in the vendor's favor
    VendorFavor,
}

/// The wallet ledger engine
pub struct WalletLedger<S: LedgerStore> {
    store: S,
    sink: Arc<dyn NotificationSink>,
    metrics: Metrics,
    config: LedgerConfig,
}

impl<S: LedgerStore> WalletLedger<S> {
    /// Create an engine with the default logging sink
    pub fn new(store: S, config: LedgerConfig) -> Result<Self> {
        Self::with_sink(store, config, Arc::new(TracingSink))
    }

    /// Create an engine with an injected notification sink
    pub fn with_sink(
        store: S,
        config: LedgerConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self {
            store,
            sink,
            metrics,
            config,
        })
    }

    /// Underlying store (reads, test seeding)
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Hold order funds for a vendor: pending += amount
    ///
    /// Called when an order is paid but not yet delivery-confirmed.
    pub async fn record_hold(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        order_ref: OrderRef,
    ) -> Result<(Wallet, LedgerEntry)> {
        let result = self
            .apply_op(
                vendor_id,
                LedgerOp::Hold {
                    amount,
                    order_ref: order_ref.clone(),
                },
            )
            .await?;
        self.dispatch(LedgerNotification::FundsHeld {
            vendor_id,
            amount,
            order_ref: order_ref.to_string(),
        });
        Ok(result)
    }

    /// Deduct the platform's cut from held funds: pending -= amount
    ///
    /// Must run before the release for the same order reference so
    /// only the vendor's net share is ever released.
    pub async fn record_commission(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        order_ref: OrderRef,
        rate: Option<Decimal>,
    ) -> Result<(Wallet, LedgerEntry)> {
        self.apply_op(
            vendor_id,
            LedgerOp::Commission {
                amount,
                order_ref,
                rate,
            },
        )
        .await
    }

    /// Release held funds on delivery confirmation: pending -= amount,
    /// available += amount, total_earnings += amount
    ///
    /// Fails with `InvalidState` if no commission was recorded for the
    /// same order reference; a gross release with no deduction is a
    /// bug upstream, never something to paper over.
    pub async fn record_release(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        order_ref: OrderRef,
    ) -> Result<(Wallet, LedgerEntry)> {
        let result = self
            .apply_op(
                vendor_id,
                LedgerOp::Release {
                    amount,
                    order_ref: order_ref.clone(),
                },
            )
            .await?;
        self.dispatch(LedgerNotification::FundsReleased {
            vendor_id,
            amount,
            order_ref: order_ref.to_string(),
        });
        Ok(result)
    }

    /// Credit a vendor wallet outside the order flow: available += amount
    pub async fn record_refund(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        reason: impl Into<String>,
        dispute_id: Option<Uuid>,
    ) -> Result<(Wallet, LedgerEntry)> {
        self.apply_op(
            vendor_id,
            LedgerOp::Refund {
                amount,
                reason: reason.into(),
                dispute_id,
            },
        )
        .await
    }

    /// File a payout request; balances are untouched until an admin
    /// approves
    pub async fn request_payout(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<Payout> {
        if amount <= Decimal::ZERO {
            return Err(Error::Ledger(wallet_core::Error::Validation(format!(
                "payout amount must be positive, got {}",
                amount
            ))));
        }
        bank.validate().map_err(Error::Ledger)?;

        let timer = Instant::now();
        let payout = self.store.create_payout(vendor_id, amount, bank).await?;
        self.metrics.op_duration.observe(timer.elapsed().as_secs_f64());
        self.metrics
            .payout_transitions_total
            .with_label_values(&[payout.status.as_str()])
            .inc();

        info!(
            vendor = %vendor_id,
            payout = %payout.id,
            amount = %payout.amount,
            currency = %self.config.currency,
            "payout requested"
        );
        self.dispatch(LedgerNotification::PayoutRequested {
            vendor_id,
            payout_id: payout.id,
            amount: payout.amount,
        });
        Ok(payout)
    }

    /// Approve a payout: PENDING → PROCESSING, deducting the available
    /// balance. The only operation that removes funds from a wallet
    /// for a payout.
    pub async fn process_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let timer = Instant::now();
        let (payout, wallet) = self.store.process_payout(payout_id).await?;
        self.metrics.op_duration.observe(timer.elapsed().as_secs_f64());
        self.record_transition(&payout);

        info!(
            payout = %payout.id,
            amount = %payout.amount,
            available = %wallet.available_balance,
            "payout processing"
        );
        self.dispatch(payout_notification(
            payout.status,
            wallet.vendor_id,
            payout.id,
            payout.amount,
            None,
            None,
        ));
        Ok(payout)
    }

    /// Confirm the bank transfer: PROCESSING → COMPLETED
    pub async fn complete_payout(
        &self,
        payout_id: Uuid,
        transaction_ref: impl AsRef<str>,
    ) -> Result<Payout> {
        let transaction_ref = transaction_ref.as_ref();
        if transaction_ref.trim().is_empty() {
            return Err(Error::Ledger(wallet_core::Error::Validation(
                "transaction reference is required to complete a payout".into(),
            )));
        }

        let timer = Instant::now();
        let (payout, wallet) = self.store.complete_payout(payout_id, transaction_ref).await?;
        self.metrics.op_duration.observe(timer.elapsed().as_secs_f64());
        self.record_transition(&payout);

        info!(
            payout = %payout.id,
            transaction_ref,
            total_withdrawn = %wallet.total_withdrawn,
            "payout completed"
        );
        self.dispatch(payout_notification(
            payout.status,
            wallet.vendor_id,
            payout.id,
            payout.amount,
            payout.transaction_ref.as_deref(),
            None,
        ));
        Ok(payout)
    }

    /// Record a failed transfer: PROCESSING → FAILED, crediting the
    /// amount back to the wallet
    pub async fn fail_payout(&self, payout_id: Uuid, reason: impl AsRef<str>) -> Result<Payout> {
        let reason = reason.as_ref();
        let timer = Instant::now();
        let (payout, wallet) = self.store.fail_payout(payout_id, reason).await?;
        self.metrics.op_duration.observe(timer.elapsed().as_secs_f64());
        self.record_transition(&payout);

        warn!(
            payout = %payout.id,
            reason,
            available = %wallet.available_balance,
            "payout failed, funds returned"
        );
        self.dispatch(payout_notification(
            payout.status,
            wallet.vendor_id,
            payout.id,
            payout.amount,
            None,
            Some(reason),
        ));
        Ok(payout)
    }

    /// Withdraw a payout request while it is still PENDING
    pub async fn cancel_payout(&self, payout_id: Uuid, vendor_id: VendorId) -> Result<()> {
        let payout = self.store.cancel_payout(payout_id, vendor_id).await?;
        info!(payout = %payout.id, vendor = %vendor_id, "payout cancelled");
        Ok(())
    }

    /// Compute the refund plan for a disputed order without applying it
    pub async fn calculate_dispute_refund(&self, order_id: Uuid) -> Result<RefundPlan> {
        let dispute = self.store.get_dispute_by_order(order_id).await?;
        dispute.ensure_resolvable().map_err(Error::Ledger)?;
        let order = self.store.get_order_snapshot(order_id).await?;
        build_refund_plan(&order).map_err(Error::Ledger)
    }

    /// Resolve a dispute
    ///
    /// CustomerFavor computes the plan (scaled down to any admin
    /// partial amount), claims the dispute row first so a concurrent
    /// resolution cannot double-apply, then credits each vendor wallet
    /// through an atomic REFUND op. VendorFavor is a status change
    /// only.
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        resolution: Resolution,
        admin_notes: impl Into<String>,
    ) -> Result<(Dispute, Option<RefundPlan>)> {
        let admin_notes = admin_notes.into();
        let dispute = self.store.get_dispute(dispute_id).await?;
        dispute.ensure_resolvable().map_err(Error::Ledger)?;

        match resolution {
            Resolution::VendorFavor => {
                let resolved = self
                    .store
                    .resolve_dispute(
                        dispute_id,
                        DisputeStatus::ResolvedVendorFavor,
                        &admin_notes,
                        None,
                    )
                    .await?;
                self.metrics.disputes_resolved_total.inc();
                info!(dispute = %dispute_id, "dispute resolved in vendor favor");
                self.dispatch(LedgerNotification::DisputeResolved {
                    dispute_id,
                    order_id: resolved.order_id,
                    status: resolved.status,
                    refund_total: None,
                });
                Ok((resolved, None))
            }
            Resolution::CustomerFavor { custom_refund } => {
                let order = self.store.get_order_snapshot(dispute.order_id).await?;
                let mut plan = build_refund_plan(&order).map_err(Error::Ledger)?;
                if let Some(custom) = custom_refund {
                    plan = plan.with_custom_amount(custom).map_err(Error::Ledger)?;
                }

                // claim the dispute before moving any money
                let resolved = self
                    .store
                    .resolve_dispute(
                        dispute_id,
                        DisputeStatus::ResolvedCustomerFavor,
                        &admin_notes,
                        Some(&plan),
                    )
                    .await?;

                for refund in &plan.vendor_refunds {
                    let reason = format!(
                        "Dispute {} resolved for order {}",
                        dispute_id, order.order_number
                    );
                    if let Err(err) = self
                        .record_refund(refund.vendor_id, refund.amount, reason, Some(dispute_id))
                        .await
                    {
                        // the dispute is already claimed; surface the
                        // partial application loudly instead of
                        // retrying blind
                        tracing::error!(
                            dispute = %dispute_id,
                            vendor = %refund.vendor_id,
                            error = %err,
                            "dispute refund credit failed after claim"
                        );
                        return Err(err);
                    }
                }

                self.metrics.disputes_resolved_total.inc();
                info!(
                    dispute = %dispute_id,
                    refund_total = %plan.order_total,
                    commission_reversed = %plan.platform_commission,
                    vendors = plan.vendor_refunds.len(),
                    "dispute resolved in customer favor"
                );
                self.dispatch(LedgerNotification::DisputeResolved {
                    dispute_id,
                    order_id: resolved.order_id,
                    status: resolved.status,
                    refund_total: Some(plan.order_total),
                });
                Ok((resolved, Some(plan)))
            }
        }
    }

    async fn apply_op(
        &self,
        vendor_id: VendorId,
        op: LedgerOp,
    ) -> Result<(Wallet, LedgerEntry)> {
        let timer = Instant::now();
        let (wallet, entry) = self.store.apply_wallet_op(vendor_id, op).await?;
        self.metrics.op_duration.observe(timer.elapsed().as_secs_f64());
        self.metrics
            .ops_total
            .with_label_values(&[entry.kind.as_str()])
            .inc();

        info!(
            vendor = %vendor_id,
            wallet = %wallet.id,
            kind = %entry.kind,
            amount = %entry.amount,
            pending = %wallet.pending_balance,
            available = %wallet.available_balance,
            "ledger entry appended"
        );
        Ok((wallet, entry))
    }

    fn record_transition(&self, payout: &Payout) {
        self.metrics
            .payout_transitions_total
            .with_label_values(&[payout.status.as_str()])
            .inc();
    }

    /// Fire-and-forget: a sink failure is logged and swallowed, never
    /// surfaced to the caller of the financial operation
    fn dispatch(&self, notification: LedgerNotification) {
        if !self.config.notifications_enabled {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let event = notification.event_name();
        tokio::spawn(async move {
            if let Err(err) = sink.notify(notification).await {
                warn!(event, error = %err, "notification dispatch failed");
            }
        });
    }
}

impl<S: LedgerStore> std::fmt::Debug for WalletLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLedger")
            .field("currency", &self.config.currency)
            .finish_non_exhaustive()
    }
}
