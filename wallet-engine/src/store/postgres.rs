//! Postgres ledger store
//!
//! Every mutating method runs one transaction that locks the rows it
//! touches (`SELECT ... FOR UPDATE`), re-reads balances inside that
//! scope, applies the domain logic from `wallet_core`, and commits the
//! balance delta together with its audit entry. Schema lives in
//! `migrations/0001_wallet_ledger.sql`.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;
use wallet_core::{
    BankDetails, Dispute, DisputeStatus, EntryDetail, EntryKind, LedgerEntry, LedgerOp,
    OrderItemSnapshot, OrderSnapshot, Payout, PayoutStatus, RefundPlan, VendorId, Wallet,
};

use super::LedgerStore;
use crate::config::DatabaseConfig;
use crate::{Error, Result};

/// Postgres-backed ledger store
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Connect a new store
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool (health checks, migrations)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lock the vendor's wallet row, if one exists
    async fn try_lock_wallet_by_vendor(
        tx: &mut Transaction<'_, Postgres>,
        vendor_id: VendorId,
    ) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, pending_balance, available_balance,
                   total_earnings, total_withdrawn, created_at, updated_at
            FROM wallets
            WHERE vendor_id = $1
            FOR UPDATE
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;
        row.map(|r| wallet_from_row(&r)).transpose()
    }

    /// Lock the vendor's wallet row, creating it lazily when absent
    async fn lock_wallet_by_vendor(
        tx: &mut Transaction<'_, Postgres>,
        vendor_id: VendorId,
    ) -> Result<Wallet> {
        if let Some(wallet) = Self::try_lock_wallet_by_vendor(tx, vendor_id).await? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(vendor_id);
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, vendor_id, pending_balance, available_balance,
                total_earnings, total_withdrawn, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.vendor_id.as_uuid())
        .bind(wallet.pending_balance)
        .bind(wallet.available_balance)
        .bind(wallet.total_earnings)
        .bind(wallet.total_withdrawn)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(wallet)
    }

    /// Lock a wallet row by wallet id; the row must exist
    async fn lock_wallet_by_id(
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: Uuid,
    ) -> Result<Wallet> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, pending_balance, available_balance,
                   total_earnings, total_withdrawn, created_at, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("wallet", wallet_id)))?;
        wallet_from_row(&row)
    }

    /// Lock a payout row
    async fn lock_payout(
        tx: &mut Transaction<'_, Postgres>,
        payout_id: Uuid,
    ) -> Result<Payout> {
        let row = sqlx::query(
            r#"
            SELECT id, wallet_id, amount, bank_name, account_number,
                   account_holder, branch_code, status, transaction_ref,
                   notes, requested_at, processed_at
            FROM payouts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(payout_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;
        payout_from_row(&row)
    }

    async fn update_wallet(tx: &mut Transaction<'_, Postgres>, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET pending_balance = $1,
                available_balance = $2,
                total_earnings = $3,
                total_withdrawn = $4,
                updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(wallet.pending_balance)
        .bind(wallet.available_balance)
        .bind(wallet.total_earnings)
        .bind(wallet.total_withdrawn)
        .bind(wallet.updated_at)
        .bind(wallet.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_entry(tx: &mut Transaction<'_, Postgres>, entry: &LedgerEntry) -> Result<()> {
        let order_ref = entry.detail.order_ref().map(|r| r.as_str().to_string());
        sqlx::query(
            r#"
            INSERT INTO wallet_entries (
                id, wallet_id, kind, amount, balance_before, balance_after,
                description, detail, order_ref, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(&entry.description)
        .bind(serde_json::to_value(&entry.detail)?)
        .bind(order_ref)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_payout(tx: &mut Transaction<'_, Postgres>, payout: &Payout) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payouts
            SET status = $1,
                transaction_ref = $2,
                notes = $3,
                processed_at = $4
            WHERE id = $5
            "#,
        )
        .bind(payout.status.as_str())
        .bind(&payout.transaction_ref)
        .bind(&payout.notes)
        .bind(payout.processed_at)
        .bind(payout.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PgLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLedgerStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn apply_wallet_op(
        &self,
        vendor_id: VendorId,
        op: LedgerOp,
    ) -> Result<(Wallet, LedgerEntry)> {
        let mut tx = self.pool.begin().await?;

        // a release against a never-touched wallet is a lookup failure,
        // never a lazy create
        let mut wallet = if matches!(op, LedgerOp::Release { .. }) {
            Self::try_lock_wallet_by_vendor(&mut tx, vendor_id)
                .await?
                .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("wallet", vendor_id)))?
        } else {
            Self::lock_wallet_by_vendor(&mut tx, vendor_id).await?
        };

        if let LedgerOp::Release { order_ref, .. } = &op {
            let commissioned: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM wallet_entries
                    WHERE wallet_id = $1 AND kind = 'COMMISSION' AND order_ref = $2
                )
                "#,
            )
            .bind(wallet.id)
            .bind(order_ref.as_str())
            .fetch_one(&mut *tx)
            .await?;
            if !commissioned {
                return Err(Error::Ledger(wallet_core::Error::InvalidState(format!(
                    "no commission recorded for order {} before release",
                    order_ref
                ))));
            }
        }

        let entry = wallet.apply(&op).map_err(Error::Ledger)?;
        Self::update_wallet(&mut tx, &wallet).await?;
        Self::insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok((wallet, entry))
    }

    async fn get_wallet(&self, vendor_id: VendorId) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, pending_balance, available_balance,
                   total_earnings, total_withdrawn, created_at, updated_at
            FROM wallets
            WHERE vendor_id = $1
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| wallet_from_row(&r)).transpose()
    }

    async fn list_entries(&self, vendor_id: VendorId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.wallet_id, e.kind, e.amount, e.balance_before,
                   e.balance_after, e.description, e.detail, e.created_at
            FROM wallet_entries e
            JOIN wallets w ON w.id = e.wallet_id
            WHERE w.vendor_id = $1
            ORDER BY e.created_at ASC
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn create_payout(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<Payout> {
        let mut tx = self.pool.begin().await?;

        let wallet = Self::lock_wallet_by_vendor(&mut tx, vendor_id).await?;

        let has_pending: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payouts WHERE wallet_id = $1 AND status = 'PENDING'
            )
            "#,
        )
        .bind(wallet.id)
        .fetch_one(&mut *tx)
        .await?;
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
        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, wallet_id, amount, bank_name, account_number,
                account_holder, branch_code, status, requested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payout.id)
        .bind(payout.wallet_id)
        .bind(payout.amount)
        .bind(&payout.bank.bank_name)
        .bind(&payout.bank.account_number)
        .bind(&payout.bank.account_holder)
        .bind(&payout.bank.branch_code)
        .bind(payout.status.as_str())
        .bind(payout.requested_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(payout)
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let row = sqlx::query(
            r#"
            SELECT id, wallet_id, amount, bank_name, account_number,
                   account_holder, branch_code, status, transaction_ref,
                   notes, requested_at, processed_at
            FROM payouts
            WHERE id = $1
            "#,
        )
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("payout", payout_id)))?;
        payout_from_row(&row)
    }

    async fn list_payouts(&self, vendor_id: VendorId) -> Result<Vec<Payout>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.wallet_id, p.amount, p.bank_name, p.account_number,
                   p.account_holder, p.branch_code, p.status, p.transaction_ref,
                   p.notes, p.requested_at, p.processed_at
            FROM payouts p
            JOIN wallets w ON w.id = p.wallet_id
            WHERE w.vendor_id = $1
            ORDER BY p.requested_at DESC
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(payout_from_row).collect()
    }

    async fn process_payout(&self, payout_id: Uuid) -> Result<(Payout, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let mut payout = Self::lock_payout(&mut tx, payout_id).await?;
        payout.begin_processing().map_err(Error::Ledger)?;

        // balance re-validated against the row read under lock, not
        // whatever the admin's dashboard showed
        let mut wallet = Self::lock_wallet_by_id(&mut tx, payout.wallet_id).await?;
        let entry = wallet
            .apply(&LedgerOp::PayoutDebit {
                amount: payout.amount,
                payout_id: payout.id,
                bank: payout.bank.clone(),
            })
            .map_err(Error::Ledger)?;

        Self::update_wallet(&mut tx, &wallet).await?;
        Self::insert_entry(&mut tx, &entry).await?;
        Self::update_payout(&mut tx, &payout).await?;

        tx.commit().await?;
        Ok((payout, wallet))
    }

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        transaction_ref: &str,
    ) -> Result<(Payout, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let mut payout = Self::lock_payout(&mut tx, payout_id).await?;
        payout.complete(transaction_ref).map_err(Error::Ledger)?;

        let mut wallet = Self::lock_wallet_by_id(&mut tx, payout.wallet_id).await?;
        wallet.total_withdrawn += payout.amount;
        wallet.updated_at = Utc::now();

        Self::update_wallet(&mut tx, &wallet).await?;
        Self::update_payout(&mut tx, &payout).await?;

        tx.commit().await?;
        Ok((payout, wallet))
    }

    async fn fail_payout(&self, payout_id: Uuid, reason: &str) -> Result<(Payout, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let mut payout = Self::lock_payout(&mut tx, payout_id).await?;
        payout.fail(reason).map_err(Error::Ledger)?;

        let mut wallet = Self::lock_wallet_by_id(&mut tx, payout.wallet_id).await?;
        let entry = wallet
            .apply(&LedgerOp::PayoutReversal {
                amount: payout.amount,
                payout_id: payout.id,
                reason: reason.to_string(),
            })
            .map_err(Error::Ledger)?;

        Self::update_wallet(&mut tx, &wallet).await?;
        Self::insert_entry(&mut tx, &entry).await?;
        Self::update_payout(&mut tx, &payout).await?;

        tx.commit().await?;
        Ok((payout, wallet))
    }

    async fn cancel_payout(&self, payout_id: Uuid, vendor_id: VendorId) -> Result<Payout> {
        let mut tx = self.pool.begin().await?;

        let payout = Self::lock_payout(&mut tx, payout_id).await?;

        let owner: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT vendor_id FROM wallets WHERE id = $1"#,
        )
        .bind(payout.wallet_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owner != Some(vendor_id.as_uuid()) {
            return Err(Error::Ledger(wallet_core::Error::Validation(format!(
                "payout {} is not owned by vendor {}",
                payout_id, vendor_id
            ))));
        }
        payout.ensure_cancellable().map_err(Error::Ledger)?;

        sqlx::query(r#"DELETE FROM payouts WHERE id = $1"#)
            .bind(payout_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(payout)
    }

    async fn get_order_snapshot(&self, order_id: Uuid) -> Result<OrderSnapshot> {
        let row = sqlx::query(
            r#"
            SELECT order_id, order_number, charged_total, shipping_fee, items
            FROM order_snapshots
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("order", order_id)))?;

        let items: Vec<OrderItemSnapshot> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("items")?)?;
        Ok(OrderSnapshot {
            order_id: row.try_get("order_id")?,
            order_number: row.try_get("order_number")?,
            charged_total: row.try_get("charged_total")?,
            shipping_fee: row.try_get("shipping_fee")?,
            items,
        })
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, reason, admin_notes, opened_at, resolved_at
            FROM disputes
            WHERE id = $1
            "#,
        )
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", dispute_id)))?;
        dispute_from_row(&row)
    }

    async fn get_dispute_by_order(&self, order_id: Uuid) -> Result<Dispute> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, reason, admin_notes, opened_at, resolved_at
            FROM disputes
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", order_id)))?;
        dispute_from_row(&row)
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        admin_notes: &str,
        plan: Option<&RefundPlan>,
    ) -> Result<Dispute> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, reason, admin_notes, opened_at, resolved_at
            FROM disputes
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(dispute_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::Ledger(wallet_core::Error::not_found("dispute", dispute_id)))?;
        let mut dispute = dispute_from_row(&row)?;

        dispute.resolve(status, admin_notes).map_err(Error::Ledger)?;

        sqlx::query(
            r#"
            UPDATE disputes
            SET status = $1,
                admin_notes = $2,
                resolution_plan = $3,
                resolved_at = $4
            WHERE id = $5
            "#,
        )
        .bind(dispute.status.as_str())
        .bind(&dispute.admin_notes)
        .bind(plan.map(serde_json::to_value).transpose()?)
        .bind(dispute.resolved_at)
        .bind(dispute.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(dispute)
    }
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet> {
    Ok(Wallet {
        id: row.try_get("id")?,
        vendor_id: VendorId(row.try_get("vendor_id")?),
        pending_balance: row.try_get("pending_balance")?,
        available_balance: row.try_get("available_balance")?,
        total_earnings: row.try_get("total_earnings")?,
        total_withdrawn: row.try_get("total_withdrawn")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payout_from_row(row: &PgRow) -> Result<Payout> {
    let status: String = row.try_get("status")?;
    let status = PayoutStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("unknown payout status `{}`", status)))?;
    Ok(Payout {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        amount: row.try_get("amount")?,
        bank: BankDetails {
            bank_name: row.try_get("bank_name")?,
            account_number: row.try_get("account_number")?,
            account_holder: row.try_get("account_holder")?,
            branch_code: row.try_get("branch_code")?,
        },
        status,
        transaction_ref: row.try_get("transaction_ref")?,
        notes: row.try_get("notes")?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    let kind = EntryKind::parse(&kind)
        .ok_or_else(|| Error::Internal(format!("unknown entry kind `{}`", kind)))?;
    let detail: EntryDetail =
        serde_json::from_value(row.try_get::<serde_json::Value, _>("detail")?)?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        kind,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        description: row.try_get("description")?,
        detail,
        created_at: row.try_get("created_at")?,
    })
}

fn dispute_from_row(row: &PgRow) -> Result<Dispute> {
    let status: String = row.try_get("status")?;
    let status = DisputeStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("unknown dispute status `{}`", status)))?;
    Ok(Dispute {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status,
        reason: row.try_get("reason")?,
        admin_notes: row.try_get("admin_notes")?,
        opened_at: row.try_get("opened_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}
