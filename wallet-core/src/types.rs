//! Core types for the vendor wallet ledger
//!
//! All money fields use exact decimal arithmetic (`rust_decimal`),
//! quantized to 2 fractional digits. Balances never go negative; every
//! balance mutation produces exactly one immutable [`LedgerEntry`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Number of fractional digits every stored amount is quantized to
pub const MONEY_SCALE: u32 = 2;

/// Vendor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(pub Uuid);

impl VendorId {
    /// Generate a fresh vendor id (tests and fixtures)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VendorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order (or order-item) reference carried on HOLD/COMMISSION/RELEASE
/// entries, e.g. `"ORD-2024-0193"` or `"ORD-2024-0193:3"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef(String);

impl OrderRef {
    /// Create a new order reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bank account details attached to a payout request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    /// Bank name
    pub bank_name: String,
    /// Account number
    pub account_number: String,
    /// Account holder name
    pub account_holder: String,
    /// Branch code
    pub branch_code: String,
}

impl BankDetails {
    /// Validate that no field is blank
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("bank_name", &self.bank_name),
            ("account_number", &self.account_number),
            ("account_holder", &self.account_holder),
            ("branch_code", &self.branch_code),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("bank detail `{}` is empty", name)));
            }
        }
        Ok(())
    }
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Funds earmarked for a paid order, not yet withdrawable
    Hold,
    /// Platform cut deducted from held funds
    Commission,
    /// Held funds moved to withdrawable on delivery confirmation
    Release,
    /// Vendor wallet credited on dispute resolution
    Refund,
    /// Available funds debited for an approved payout
    Payout,
    /// Reversal credit (failed payout returned to the wallet)
    Credit,
}

impl EntryKind {
    /// Stable string form used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Hold => "HOLD",
            EntryKind::Commission => "COMMISSION",
            EntryKind::Release => "RELEASE",
            EntryKind::Refund => "REFUND",
            EntryKind::Payout => "PAYOUT",
            EntryKind::Credit => "CREDIT",
        }
    }

    /// Parse from the stable string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOLD" => Some(EntryKind::Hold),
            "COMMISSION" => Some(EntryKind::Commission),
            "RELEASE" => Some(EntryKind::Release),
            "REFUND" => Some(EntryKind::Refund),
            "PAYOUT" => Some(EntryKind::Payout),
            "CREDIT" => Some(EntryKind::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-kind entry metadata
///
/// Each variant carries only the fields relevant to its kind, so audit
/// queries never have to poke through untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDetail {
    /// Order funds held
    Hold {
        /// Originating order reference
        order_ref: OrderRef,
    },
    /// Platform commission deducted
    Commission {
        /// Originating order reference
        order_ref: OrderRef,
        /// Commission rate applied, when known at call time
        #[serde(skip_serializing_if = "Option::is_none")]
        rate: Option<Decimal>,
    },
    /// Held funds released
    Release {
        /// Originating order reference
        order_ref: OrderRef,
    },
    /// Dispute refund credit
    Refund {
        /// Human-readable reason
        reason: String,
        /// Dispute that produced the refund, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        dispute_id: Option<Uuid>,
    },
    /// Payout debit
    Payout {
        /// Payout row this debit belongs to
        payout_id: Uuid,
        /// Destination bank account
        bank: BankDetails,
    },
    /// Failed payout reversal
    Credit {
        /// Payout row being reversed
        payout_id: Uuid,
        /// Failure reason recorded by the admin
        reason: String,
    },
}

impl EntryDetail {
    /// Entry kind implied by this detail
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryDetail::Hold { .. } => EntryKind::Hold,
            EntryDetail::Commission { .. } => EntryKind::Commission,
            EntryDetail::Release { .. } => EntryKind::Release,
            EntryDetail::Refund { .. } => EntryKind::Refund,
            EntryDetail::Payout { .. } => EntryKind::Payout,
            EntryDetail::Credit { .. } => EntryKind::Credit,
        }
    }

    /// Order reference carried by HOLD/COMMISSION/RELEASE details
    pub fn order_ref(&self) -> Option<&OrderRef> {
        match self {
            EntryDetail::Hold { order_ref }
            | EntryDetail::Commission { order_ref, .. }
            | EntryDetail::Release { order_ref } => Some(order_ref),
            _ => None,
        }
    }
}

/// Immutable audit record of a single balance mutation
///
/// Created once per wallet op, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry id
    pub id: Uuid,
    /// Wallet this entry belongs to
    pub wallet_id: Uuid,
    /// Entry kind (derived from `detail`)
    pub kind: EntryKind,
    /// Positive magnitude; direction is implied by `kind`
    pub amount: Decimal,
    /// Mutated balance field before the op
    pub balance_before: Decimal,
    /// Mutated balance field after the op
    pub balance_after: Decimal,
    /// Human-readable description
    pub description: String,
    /// Kind-specific metadata
    pub detail: EntryDetail,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A balance-mutating operation against one wallet
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOp {
    /// Earmark order funds: pending += amount
    Hold {
        /// Amount to hold
        amount: Decimal,
        /// Originating order reference
        order_ref: OrderRef,
    },
    /// Deduct platform cut: pending -= amount
    Commission {
        /// Commission amount
        amount: Decimal,
        /// Originating order reference
        order_ref: OrderRef,
        /// Rate the amount was derived from, when known
        rate: Option<Decimal>,
    },
    /// Move funds to withdrawable: pending -= amount,
    /// available += amount, total_earnings += amount
    Release {
        /// Amount to release
        amount: Decimal,
        /// Originating order reference
        order_ref: OrderRef,
    },
    /// Credit the wallet on dispute resolution: available += amount
    Refund {
        /// Refund amount
        amount: Decimal,
        /// Human-readable reason
        reason: String,
        /// Dispute that produced the refund, if any
        dispute_id: Option<Uuid>,
    },
    /// Return a failed payout to the wallet: available += amount
    PayoutReversal {
        /// Amount being returned
        amount: Decimal,
        /// Payout row being reversed
        payout_id: Uuid,
        /// Failure reason
        reason: String,
    },
    /// Debit an approved payout: available -= amount
    PayoutDebit {
        /// Payout amount
        amount: Decimal,
        /// Payout row this debit belongs to
        payout_id: Uuid,
        /// Destination bank account
        bank: BankDetails,
    },
}

impl LedgerOp {
    /// Amount this op moves (positive magnitude)
    pub fn amount(&self) -> Decimal {
        match self {
            LedgerOp::Hold { amount, .. }
            | LedgerOp::Commission { amount, .. }
            | LedgerOp::Release { amount, .. }
            | LedgerOp::Refund { amount, .. }
            | LedgerOp::PayoutReversal { amount, .. }
            | LedgerOp::PayoutDebit { amount, .. } => *amount,
        }
    }

    /// Entry kind this op will record
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerOp::Hold { .. } => EntryKind::Hold,
            LedgerOp::Commission { .. } => EntryKind::Commission,
            LedgerOp::Release { .. } => EntryKind::Release,
            LedgerOp::Refund { .. } => EntryKind::Refund,
            LedgerOp::PayoutReversal { .. } => EntryKind::Credit,
            LedgerOp::PayoutDebit { .. } => EntryKind::Payout,
        }
    }

    /// Order reference carried by this op, if any
    pub fn order_ref(&self) -> Option<&OrderRef> {
        match self {
            LedgerOp::Hold { order_ref, .. }
            | LedgerOp::Commission { order_ref, .. }
            | LedgerOp::Release { order_ref, .. } => Some(order_ref),
            _ => None,
        }
    }

    fn detail(&self) -> EntryDetail {
        match self {
            LedgerOp::Hold { order_ref, .. } => EntryDetail::Hold {
                order_ref: order_ref.clone(),
            },
            LedgerOp::Commission { order_ref, rate, .. } => EntryDetail::Commission {
                order_ref: order_ref.clone(),
                rate: *rate,
            },
            LedgerOp::Release { order_ref, .. } => EntryDetail::Release {
                order_ref: order_ref.clone(),
            },
            LedgerOp::Refund {
                reason, dispute_id, ..
            } => EntryDetail::Refund {
                reason: reason.clone(),
                dispute_id: *dispute_id,
            },
            LedgerOp::PayoutReversal {
                payout_id, reason, ..
            } => EntryDetail::Credit {
                payout_id: *payout_id,
                reason: reason.clone(),
            },
            LedgerOp::PayoutDebit {
                payout_id, bank, ..
            } => EntryDetail::Payout {
                payout_id: *payout_id,
                bank: bank.clone(),
            },
        }
    }

    fn description(&self) -> String {
        match self {
            LedgerOp::Hold { order_ref, .. } => format!("Funds held for order {}", order_ref),
            LedgerOp::Commission { order_ref, .. } => {
                format!("Platform commission for order {}", order_ref)
            }
            LedgerOp::Release { order_ref, .. } => {
                format!("Earnings released for order {}", order_ref)
            }
            LedgerOp::Refund { reason, .. } => format!("Refund credit: {}", reason),
            LedgerOp::PayoutReversal {
                payout_id, reason, ..
            } => format!("Payout {} reversed: {}", payout_id, reason),
            LedgerOp::PayoutDebit { payout_id, .. } => format!("Payout {} processed", payout_id),
        }
    }
}

/// Per-vendor wallet, created lazily on first ledger touch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet id
    pub id: Uuid,
    /// Owning vendor (unique across wallets)
    pub vendor_id: VendorId,
    /// Funds held for orders not yet delivery-confirmed
    pub pending_balance: Decimal,
    /// Funds eligible for payout
    pub available_balance: Decimal,
    /// Lifetime net earnings credited via RELEASE
    pub total_earnings: Decimal,
    /// Lifetime amount paid out via completed payouts
    pub total_withdrawn: Decimal,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a zero-balance wallet for a vendor
    pub fn new(vendor_id: VendorId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            pending_balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a single ledger op, returning the audit entry
    ///
    /// Exactly one balance delta per op. On error the wallet is left
    /// untouched. The returned entry records the mutated balance field
    /// before and after: the pending balance for HOLD/COMMISSION, the
    /// available balance for everything else.
    pub fn apply(&mut self, op: &LedgerOp) -> Result<LedgerEntry> {
        let amount = op.amount();
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "{} amount must be positive, got {}",
                op.kind(),
                amount
            )));
        }
        let amount = amount.round_dp(MONEY_SCALE);

        let (balance_before, balance_after) = match op {
            LedgerOp::Hold { .. } => {
                let before = self.pending_balance;
                self.pending_balance += amount;
                (before, self.pending_balance)
            }
            LedgerOp::Commission { .. } => {
                let before = self.pending_balance;
                if amount > before {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available: before,
                    });
                }
                self.pending_balance -= amount;
                (before, self.pending_balance)
            }
            LedgerOp::Release { .. } => {
                if amount > self.pending_balance {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available: self.pending_balance,
                    });
                }
                let before = self.available_balance;
                self.pending_balance -= amount;
                self.available_balance += amount;
                self.total_earnings += amount;
                (before, self.available_balance)
            }
            LedgerOp::Refund { .. } | LedgerOp::PayoutReversal { .. } => {
                let before = self.available_balance;
                self.available_balance += amount;
                (before, self.available_balance)
            }
            LedgerOp::PayoutDebit { .. } => {
                let before = self.available_balance;
                if amount > before {
                    return Err(Error::InsufficientBalance {
                        requested: amount,
                        available: before,
                    });
                }
                self.available_balance -= amount;
                (before, self.available_balance)
            }
        };

        self.updated_at = Utc::now();

        Ok(LedgerEntry {
            id: Uuid::new_v4(),
            wallet_id: self.id,
            kind: op.kind(),
            amount,
            balance_before,
            balance_after,
            description: op.description(),
            detail: op.detail(),
            created_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bank() -> BankDetails {
        BankDetails {
            bank_name: "Commercial Bank".into(),
            account_number: "8001234567".into(),
            account_holder: "Nimal Perera".into(),
            branch_code: "053".into(),
        }
    }

    #[test]
    fn test_hold_increases_pending() {
        let mut wallet = Wallet::new(VendorId::new());
        let entry = wallet
            .apply(&LedgerOp::Hold {
                amount: dec!(1000),
                order_ref: OrderRef::new("ORD-1"),
            })
            .unwrap();

        assert_eq!(wallet.pending_balance, dec!(1000));
        assert_eq!(wallet.available_balance, Decimal::ZERO);
        assert_eq!(entry.kind, EntryKind::Hold);
        assert_eq!(entry.balance_before, Decimal::ZERO);
        assert_eq!(entry.balance_after, dec!(1000));
    }

    #[test]
    fn test_commission_cannot_exceed_pending() {
        let mut wallet = Wallet::new(VendorId::new());
        wallet
            .apply(&LedgerOp::Hold {
                amount: dec!(100),
                order_ref: OrderRef::new("ORD-1"),
            })
            .unwrap();

        let err = wallet
            .apply(&LedgerOp::Commission {
                amount: dec!(150),
                order_ref: OrderRef::new("ORD-1"),
                rate: None,
            })
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientBalance { .. }));
        // wallet untouched on error
        assert_eq!(wallet.pending_balance, dec!(100));
    }

    #[test]
    fn test_release_moves_pending_to_available() {
        let mut wallet = Wallet::new(VendorId::new());
        wallet
            .apply(&LedgerOp::Hold {
                amount: dec!(1000),
                order_ref: OrderRef::new("ORD-1"),
            })
            .unwrap();
        wallet
            .apply(&LedgerOp::Commission {
                amount: dec!(100),
                order_ref: OrderRef::new("ORD-1"),
                rate: Some(dec!(0.10)),
            })
            .unwrap();
        let entry = wallet
            .apply(&LedgerOp::Release {
                amount: dec!(900),
                order_ref: OrderRef::new("ORD-1"),
            })
            .unwrap();

        assert_eq!(wallet.pending_balance, Decimal::ZERO);
        assert_eq!(wallet.available_balance, dec!(900));
        assert_eq!(wallet.total_earnings, dec!(900));
        assert_eq!(entry.balance_before, Decimal::ZERO);
        assert_eq!(entry.balance_after, dec!(900));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut wallet = Wallet::new(VendorId::new());
        let err = wallet
            .apply(&LedgerOp::Hold {
                amount: dec!(-5),
                order_ref: OrderRef::new("ORD-1"),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_payout_debit_and_reversal_round_trip() {
        let mut wallet = Wallet::new(VendorId::new());
        wallet
            .apply(&LedgerOp::Hold {
                amount: dec!(500),
                order_ref: OrderRef::new("ORD-2"),
            })
            .unwrap();
        wallet
            .apply(&LedgerOp::Commission {
                amount: dec!(50),
                order_ref: OrderRef::new("ORD-2"),
                rate: None,
            })
            .unwrap();
        wallet
            .apply(&LedgerOp::Release {
                amount: dec!(450),
                order_ref: OrderRef::new("ORD-2"),
            })
            .unwrap();

        let payout_id = Uuid::new_v4();
        wallet
            .apply(&LedgerOp::PayoutDebit {
                amount: dec!(450),
                payout_id,
                bank: bank(),
            })
            .unwrap();
        assert_eq!(wallet.available_balance, Decimal::ZERO);

        let entry = wallet
            .apply(&LedgerOp::PayoutReversal {
                amount: dec!(450),
                payout_id,
                reason: "bank error".into(),
            })
            .unwrap();
        assert_eq!(wallet.available_balance, dec!(450));
        assert_eq!(entry.kind, EntryKind::Credit);
    }

    #[test]
    fn test_entry_detail_round_trips_through_json() {
        let detail = EntryDetail::Payout {
            payout_id: Uuid::new_v4(),
            bank: bank(),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "PAYOUT");
        let back: EntryDetail = serde_json::from_value(json).unwrap();
        assert_eq!(back, detail);
        assert_eq!(back.kind(), EntryKind::Payout);
    }

    #[test]
    fn test_bank_details_validation() {
        let mut details = bank();
        assert!(details.validate().is_ok());
        details.account_number = "  ".into();
        assert!(matches!(details.validate(), Err(Error::Validation(_))));
    }
}
