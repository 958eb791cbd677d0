//! Dispute resolution and the multi-vendor refund calculator
//!
//! A dispute is opened per order, not per item. Resolving it in the
//! customer's favor produces a [`RefundPlan`]: how much each vendor's
//! earnings and the platform's commission must be reversed. Commission
//! rates come from the order-item snapshot captured at sale time, never
//! from a vendor's live rate, so past commission terms are never
//! retroactively changed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::types::{VendorId, MONEY_SCALE};
use crate::{Error, Result};

/// Dispute lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Filed by the customer
    Open,
    /// Picked up by an admin
    InReview,
    /// Resolved with a refund applied (terminal)
    ResolvedCustomerFavor,
    /// Resolved with no refund (terminal)
    ResolvedVendorFavor,
    /// Closed without resolution (terminal)
    Closed,
}

impl DisputeStatus {
    /// Stable string form used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::InReview => "IN_REVIEW",
            DisputeStatus::ResolvedCustomerFavor => "RESOLVED_CUSTOMER_FAVOR",
            DisputeStatus::ResolvedVendorFavor => "RESOLVED_VENDOR_FAVOR",
            DisputeStatus::Closed => "CLOSED",
        }
    }

    /// Parse from the stable string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(DisputeStatus::Open),
            "IN_REVIEW" => Some(DisputeStatus::InReview),
            "RESOLVED_CUSTOMER_FAVOR" => Some(DisputeStatus::ResolvedCustomerFavor),
            "RESOLVED_VENDOR_FAVOR" => Some(DisputeStatus::ResolvedVendorFavor),
            "CLOSED" => Some(DisputeStatus::Closed),
            _ => None,
        }
    }

    /// Resolved or closed disputes admit no further transition
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            DisputeStatus::ResolvedCustomerFavor
                | DisputeStatus::ResolvedVendorFavor
                | DisputeStatus::Closed
        )
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer dispute against one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    /// Dispute id
    pub id: Uuid,
    /// Disputed order
    pub order_id: Uuid,
    /// Current status
    pub status: DisputeStatus,
    /// Customer-supplied reason
    pub reason: String,
    /// Admin resolution notes
    pub admin_notes: Option<String>,
    /// When the dispute was filed
    pub opened_at: DateTime<Utc>,
    /// When the dispute reached a terminal state
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Open a new dispute against an order
    pub fn open(order_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status: DisputeStatus::Open,
            reason: reason.into(),
            admin_notes: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Fails with `InvalidState` once the dispute is resolved or closed
    pub fn ensure_resolvable(&self) -> Result<()> {
        if self.status.is_resolved() {
            return Err(Error::InvalidState(format!(
                "dispute {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Transition to a terminal status, recording admin notes
    pub fn resolve(&mut self, status: DisputeStatus, admin_notes: impl Into<String>) -> Result<()> {
        self.ensure_resolvable()?;
        if !status.is_resolved() {
            return Err(Error::Validation(format!(
                "{} is not a resolution status",
                status
            )));
        }
        self.status = status;
        self.admin_notes = Some(admin_notes.into());
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// One order item as frozen at sale time
///
/// `commission_rate` is the rate that applied when the order was
/// placed, expressed as a fraction (0.10 = 10%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemSnapshot {
    /// Vendor that sold the item
    pub vendor_id: VendorId,
    /// Line total (quantity x unit price)
    pub total_price: Decimal,
    /// Commission rate captured at sale time
    pub commission_rate: Decimal,
}

/// An order as frozen at sale time, the input to refund calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Order id
    pub order_id: Uuid,
    /// Human-readable order number
    pub order_number: String,
    /// Total the customer was charged (items + shipping)
    pub charged_total: Decimal,
    /// Shipping fee included in the charged total
    pub shipping_fee: Decimal,
    /// Per-vendor line items
    pub items: Vec<OrderItemSnapshot>,
}

/// Per-vendor slice of a refund plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRefund {
    /// Vendor whose earnings are reversed
    pub vendor_id: VendorId,
    /// Amount reversed for this vendor
    pub amount: Decimal,
    /// Platform commission reversed for this vendor's items
    pub commission_reversed: Decimal,
}

/// Computed breakdown of a customer-favor refund
///
/// A plan is a calculation only; applying it to wallets is a separate
/// step so the caller controls when money actually moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundPlan {
    /// Order the plan was computed for
    pub order_id: Uuid,
    /// Total to refund the customer
    pub order_total: Decimal,
    /// Total platform commission reversed across vendors
    pub platform_commission: Decimal,
    /// Per-vendor reversals
    pub vendor_refunds: Vec<VendorRefund>,
}

/// Compute the full refund plan for an order snapshot
///
/// Items are grouped by vendor; each vendor's amount is the sum of its
/// line totals and its commission reversal uses the historical rate
/// from the snapshot. Fails with `Validation` if the order has no
/// items, an item carries a non-positive price or a rate outside
/// `[0, 1)`, or the reconstructed total does not reconcile with the
/// amount the customer was actually charged.
pub fn build_refund_plan(order: &OrderSnapshot) -> Result<RefundPlan> {
    if order.items.is_empty() {
        return Err(Error::Validation(format!(
            "order {} has no items to refund",
            order.order_number
        )));
    }
    if order.shipping_fee < Decimal::ZERO {
        return Err(Error::Validation("shipping fee cannot be negative".into()));
    }

    // BTreeMap keeps vendor order deterministic across runs
    let mut by_vendor: BTreeMap<Uuid, (VendorId, Decimal, Decimal)> = BTreeMap::new();
    for item in &order.items {
        if item.total_price <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "order {} has a non-positive line total {}",
                order.order_number, item.total_price
            )));
        }
        if item.commission_rate < Decimal::ZERO || item.commission_rate >= Decimal::ONE {
            return Err(Error::Validation(format!(
                "commission rate {} out of range [0, 1)",
                item.commission_rate
            )));
        }
        let slot = by_vendor
            .entry(item.vendor_id.as_uuid())
            .or_insert((item.vendor_id, Decimal::ZERO, Decimal::ZERO));
        slot.1 += item.total_price;
        slot.2 += (item.total_price * item.commission_rate).round_dp(MONEY_SCALE);
    }

    let mut vendor_refunds = Vec::with_capacity(by_vendor.len());
    let mut items_total = Decimal::ZERO;
    let mut platform_commission = Decimal::ZERO;
    for (_, (vendor_id, amount, commission)) in by_vendor {
        items_total += amount;
        platform_commission += commission;
        vendor_refunds.push(VendorRefund {
            vendor_id,
            amount,
            commission_reversed: commission,
        });
    }

    let order_total = items_total + order.shipping_fee;
    if order_total != order.charged_total {
        return Err(Error::Validation(format!(
            "order {} items + shipping ({}) do not reconcile with charged total {}",
            order.order_number, order_total, order.charged_total
        )));
    }

    Ok(RefundPlan {
        order_id: order.order_id,
        order_total,
        platform_commission,
        vendor_refunds,
    })
}

impl RefundPlan {
    /// Scale the plan down to an admin-entered partial refund
    ///
    /// `custom` must satisfy `0 < custom <= order_total`. Each vendor's
    /// amount is pro-rated by its share of the original total and
    /// rounded to cents; rounding drift is settled against the largest
    /// share so the vendor amounts still sum to the scaled vendor
    /// portion. Commissions are re-derived from the final amounts at
    /// each vendor's original effective rate. A share that pro-rates to
    /// zero cents is dropped from the plan entirely, so every entry the
    /// plan carries is applicable as a ledger credit.
    pub fn with_custom_amount(&self, custom: Decimal) -> Result<RefundPlan> {
        if custom <= Decimal::ZERO || custom > self.order_total {
            return Err(Error::Validation(format!(
                "custom refund {} outside (0, {}]",
                custom, self.order_total
            )));
        }
        let custom = custom.round_dp(MONEY_SCALE);
        if custom == self.order_total {
            return Ok(self.clone());
        }

        let scale = custom / self.order_total;
        let vendor_portion: Decimal = self
            .vendor_refunds
            .iter()
            .map(|v| v.amount)
            .sum::<Decimal>();
        let scaled_portion = (vendor_portion * scale).round_dp(MONEY_SCALE);

        let mut refunds = Vec::with_capacity(self.vendor_refunds.len());
        let mut allocated = Decimal::ZERO;
        for vendor in &self.vendor_refunds {
            let amount = (vendor.amount * scale).round_dp(MONEY_SCALE);
            // effective rate from the original plan, not a live lookup
            let rate = if vendor.amount.is_zero() {
                Decimal::ZERO
            } else {
                vendor.commission_reversed / vendor.amount
            };
            allocated += amount;
            refunds.push((
                VendorRefund {
                    vendor_id: vendor.vendor_id,
                    amount,
                    commission_reversed: (amount * rate).round_dp(MONEY_SCALE),
                },
                rate,
            ));
        }

        // settle rounding drift on the largest share, keeping its
        // commission consistent with the adjusted amount
        let drift = scaled_portion - allocated;
        if !drift.is_zero() {
            if let Some(slot) = refunds
                .iter_mut()
                .max_by(|a, b| a.0.amount.cmp(&b.0.amount))
            {
                slot.0.amount += drift;
                slot.0.commission_reversed = (slot.0.amount * slot.1).round_dp(MONEY_SCALE);
            }
        }

        let vendor_refunds: Vec<VendorRefund> = refunds
            .into_iter()
            .map(|(refund, _)| refund)
            .filter(|refund| refund.amount > Decimal::ZERO)
            .collect();
        let platform_commission = vendor_refunds
            .iter()
            .map(|refund| refund.commission_reversed)
            .sum::<Decimal>();

        Ok(RefundPlan {
            order_id: self.order_id,
            order_total: custom,
            platform_commission,
            vendor_refunds,
        })
    }
}
