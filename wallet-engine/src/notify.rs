//! Notification dispatch
//!
//! The engine informs a [`NotificationSink`] after every committed
//! state change. Dispatch is fire-and-forget: a sink failure is logged
//! and swallowed, never rolled into the financial operation's result.
//! The sink is injected at engine construction so the ledger carries
//! no dependency on any concrete delivery channel.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use wallet_core::{DisputeStatus, PayoutStatus, VendorId};

/// A ledger state change worth telling someone about
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerNotification {
    /// Order funds held for a vendor
    FundsHeld {
        /// Vendor whose wallet was credited
        vendor_id: VendorId,
        /// Held amount
        amount: Decimal,
        /// Originating order reference
        order_ref: String,
    },
    /// Held funds released to the withdrawable balance
    FundsReleased {
        /// Vendor whose wallet was credited
        vendor_id: VendorId,
        /// Released amount
        amount: Decimal,
        /// Originating order reference
        order_ref: String,
    },
    /// Vendor filed a payout request
    PayoutRequested {
        /// Requesting vendor
        vendor_id: VendorId,
        /// Payout row
        payout_id: Uuid,
        /// Requested amount
        amount: Decimal,
    },
    /// Admin moved a payout into processing
    PayoutProcessing {
        /// Vendor being paid
        vendor_id: VendorId,
        /// Payout row
        payout_id: Uuid,
        /// Deducted amount
        amount: Decimal,
    },
    /// Payout settled at the bank
    PayoutCompleted {
        /// Vendor paid out
        vendor_id: VendorId,
        /// Payout row
        payout_id: Uuid,
        /// Transferred amount
        amount: Decimal,
        /// Bank transfer reference
        transaction_ref: String,
    },
    /// Payout failed; funds returned to the wallet
    PayoutFailed {
        /// Vendor whose funds were returned
        vendor_id: VendorId,
        /// Payout row
        payout_id: Uuid,
        /// Returned amount
        amount: Decimal,
        /// Failure reason
        reason: String,
    },
    /// Dispute reached a terminal status
    DisputeResolved {
        /// Dispute row
        dispute_id: Uuid,
        /// Disputed order
        order_id: Uuid,
        /// Resolution status
        status: DisputeStatus,
        /// Total refunded to the customer, when in their favor
        refund_total: Option<Decimal>,
    },
}

impl LedgerNotification {
    /// Short event name for logs
    pub fn event_name(&self) -> &'static str {
        match self {
            LedgerNotification::FundsHeld { .. } => "funds_held",
            LedgerNotification::FundsReleased { .. } => "funds_released",
            LedgerNotification::PayoutRequested { .. } => "payout_requested",
            LedgerNotification::PayoutProcessing { .. } => "payout_processing",
            LedgerNotification::PayoutCompleted { .. } => "payout_completed",
            LedgerNotification::PayoutFailed { .. } => "payout_failed",
            LedgerNotification::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// Downstream notification channel (email, push, in-app)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification; errors are the sink's own problem
    async fn notify(&self, notification: LedgerNotification) -> anyhow::Result<()>;
}

/// Sink that only logs, used as the default and in local runs
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, notification: LedgerNotification) -> anyhow::Result<()> {
        tracing::info!(
            event = notification.event_name(),
            payload = %serde_json::to_string(&notification).unwrap_or_default(),
            "ledger notification"
        );
        Ok(())
    }
}

/// Helper for payout notifications keyed off the resulting status
pub(crate) fn payout_notification(
    status: PayoutStatus,
    vendor_id: VendorId,
    payout_id: Uuid,
    amount: Decimal,
    transaction_ref: Option<&str>,
    reason: Option<&str>,
) -> LedgerNotification {
    match status {
        PayoutStatus::Pending => LedgerNotification::PayoutRequested {
            vendor_id,
            payout_id,
            amount,
        },
        PayoutStatus::Processing => LedgerNotification::PayoutProcessing {
            vendor_id,
            payout_id,
            amount,
        },
        PayoutStatus::Completed => LedgerNotification::PayoutCompleted {
            vendor_id,
            payout_id,
            amount,
            transaction_ref: transaction_ref.unwrap_or_default().to_string(),
        },
        PayoutStatus::Failed => LedgerNotification::PayoutFailed {
            vendor_id,
            payout_id,
            amount,
            reason: reason.unwrap_or_default().to_string(),
        },
    }
}
