//! Payout lifecycle state machine
//!
//! ```text
//! PENDING --process--> PROCESSING --complete--> COMPLETED (terminal)
//! PENDING --cancel-->  (deleted)
//! PROCESSING --fail--> FAILED (terminal, balance refunded)
//! ```
//!
//! No transition skips PROCESSING; COMPLETED and FAILED have no
//! reverse transition. A PENDING payout has never touched the wallet
//! balance, which is why cancellation is a plain delete.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::BankDetails;
use crate::{Error, Result};

/// Payout request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    /// Filed by the vendor, balance untouched
    Pending,
    /// Approved by an admin, available balance deducted
    Processing,
    /// Bank transfer confirmed (terminal)
    Completed,
    /// Bank transfer failed, balance refunded (terminal)
    Failed,
}

impl PayoutStatus {
    /// Stable string form used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
        }
    }

    /// Parse from the stable string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PayoutStatus::Pending),
            "PROCESSING" => Some(PayoutStatus::Processing),
            "COMPLETED" => Some(PayoutStatus::Completed),
            "FAILED" => Some(PayoutStatus::Failed),
            _ => None,
        }
    }

    /// COMPLETED and FAILED admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A vendor withdrawal request settled via bank transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    /// Payout id
    pub id: Uuid,
    /// Wallet the payout draws from
    pub wallet_id: Uuid,
    /// Requested amount
    pub amount: Decimal,
    /// Destination bank account
    pub bank: BankDetails,
    /// Current lifecycle status
    pub status: PayoutStatus,
    /// External transfer reference, set only on COMPLETED
    pub transaction_ref: Option<String>,
    /// Admin notes (failure reason, manual remarks)
    pub notes: Option<String>,
    /// When the vendor filed the request
    pub requested_at: DateTime<Utc>,
    /// When the request reached a terminal state
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payout {
    /// Create a new PENDING payout request
    pub fn new(wallet_id: Uuid, amount: Decimal, bank: BankDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            amount,
            bank,
            status: PayoutStatus::Pending,
            transaction_ref: None,
            notes: None,
            requested_at: Utc::now(),
            processed_at: None,
        }
    }

    fn invalid_transition(&self, action: &str, expected: PayoutStatus) -> Error {
        Error::InvalidState(format!(
            "cannot {} payout {} in status {}, expected {}",
            action, self.id, self.status, expected
        ))
    }

    /// PENDING → PROCESSING (admin approval)
    ///
    /// The caller deducts the wallet's available balance in the same
    /// transaction; this method only guards the transition.
    pub fn begin_processing(&mut self) -> Result<()> {
        if self.status != PayoutStatus::Pending {
            return Err(self.invalid_transition("process", PayoutStatus::Pending));
        }
        self.status = PayoutStatus::Processing;
        Ok(())
    }

    /// PROCESSING → COMPLETED with the bank transfer reference
    pub fn complete(&mut self, transaction_ref: impl Into<String>) -> Result<()> {
        if self.status != PayoutStatus::Processing {
            return Err(self.invalid_transition("complete", PayoutStatus::Processing));
        }
        self.status = PayoutStatus::Completed;
        self.transaction_ref = Some(transaction_ref.into());
        self.processed_at = Some(Utc::now());
        Ok(())
    }

    /// PROCESSING → FAILED, recording the reason
    ///
    /// The caller credits the amount back to the wallet in the same
    /// transaction.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.status != PayoutStatus::Processing {
            return Err(self.invalid_transition("fail", PayoutStatus::Processing));
        }
        self.status = PayoutStatus::Failed;
        self.notes = Some(reason.into());
        self.processed_at = Some(Utc::now());
        Ok(())
    }

    /// Guard for vendor cancellation: only PENDING payouts may be
    /// deleted
    pub fn ensure_cancellable(&self) -> Result<()> {
        if self.status != PayoutStatus::Pending {
            return Err(self.invalid_transition("cancel", PayoutStatus::Pending));
        }
        Ok(())
    }
}
