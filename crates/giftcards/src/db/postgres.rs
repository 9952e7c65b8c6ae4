//! `PostgreSQL` storage backend.
//!
//! The money-safety guarantees live in the SQL, not in application reads:
//! - exactly-once redemption comes from the UNIQUE constraint on
//!   `redemption_record.gift_card_id`; a violation maps to
//!   [`StoreError::Conflict`], never to a generic failure;
//! - balance mutation is a single storage-side arithmetic update
//!   (`balance = balance + $n`), so concurrent credits serialize on the
//!   wallet row and can never observe the same prior balance;
//! - status transitions are guarded in the UPDATE's WHERE clause and
//!   diagnosed after the fact when no row matched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use wildflower_core::{CardCode, CardStatus, Email, GiftCardId, IdentityId, Money, RedemptionId, TransactionId, TransactionKind, UsageId, WalletId};

use super::{Store, StoreError};
use crate::models::{
    CardUsage, GiftCard, LedgerEntry, NewGiftCard, NewRedemption, RedemptionRecord,
    TransactionReference, Wallet, WalletTransaction,
};

/// Column list shared by every query that materializes a full card row.
const CARD_COLUMNS: &str = "id, code, token_hash, face_amount, remaining_amount, status, \
     purchaser_name, purchaser_email, purchaser_phone, recipient_name, recipient_email, \
     gift_message, is_gift, purchased_at, expires_at, token_expires_at, redeemed_at, \
     redeemed_by, wallet_id, cancel_reason, created_at, updated_at";

/// `PostgreSQL`-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Re-read a card inside `tx` to turn a zero-row guarded UPDATE into
    /// a precise error. Lazily expires a stale card while at it.
    async fn diagnose_guard_failure(
        tx: &mut Transaction<'_, Postgres>,
        id: GiftCardId,
        requested: Option<Money>,
    ) -> Result<StoreError, StoreError> {
        let query = format!("SELECT {CARD_COLUMNS} FROM gift_card WHERE id = $1");
        let row: Option<CardRow> = sqlx::query_as(&query)
            .bind(id.as_i64())
            .fetch_optional(&mut **tx)
            .await?;
        let Some(row) = row else {
            return Ok(StoreError::NotFound);
        };
        let card = row.into_card()?;

        if card.should_expire(Utc::now()) {
            sqlx::query(
                "UPDATE gift_card SET status = 'expired', updated_at = now() \
                 WHERE id = $1 AND status IN ('active', 'partially_used')",
            )
            .bind(id.as_i64())
            .execute(&mut **tx)
            .await?;
            return Ok(StoreError::StatusGuard {
                current: CardStatus::Expired,
            });
        }

        if let Some(requested) = requested
            && (card.status.allows_use() || card.status == CardStatus::Used)
            && card.remaining_amount < requested
        {
            return Ok(StoreError::InsufficientValue {
                remaining: card.remaining_amount,
                requested,
            });
        }

        Ok(StoreError::StatusGuard {
            current: card.status,
        })
    }
}

/// Map a unique-constraint violation to [`StoreError::Conflict`].
fn map_unique(e: sqlx::Error, conflict: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(conflict.to_owned());
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PgStore {
    async fn create_card(&self, new: NewGiftCard) -> Result<GiftCard, StoreError> {
        let query = format!(
            "INSERT INTO gift_card (code, token_hash, face_amount, remaining_amount, status, \
                 purchaser_name, purchaser_email, purchaser_phone, recipient_name, \
                 recipient_email, gift_message, is_gift, purchased_at, expires_at, \
                 token_expires_at) \
             VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {CARD_COLUMNS}"
        );
        let row: CardRow = sqlx::query_as(&query)
            .bind(new.code.as_str())
            .bind(&new.token_hash)
            .bind(new.face_amount.cents())
            .bind(new.status)
            .bind(&new.purchaser_name)
            .bind(new.purchaser_email.as_str())
            .bind(&new.purchaser_phone)
            .bind(&new.recipient_name)
            .bind(new.recipient_email.as_ref().map(Email::as_str))
            .bind(&new.gift_message)
            .bind(new.is_gift)
            .bind(new.purchased_at)
            .bind(new.expires_at)
            .bind(new.token_expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "card code or token already exists"))?;
        row.into_card()
    }

    async fn get_card(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError> {
        let query = format!("SELECT {CARD_COLUMNS} FROM gift_card WHERE id = $1");
        let row: Option<CardRow> = sqlx::query_as(&query)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(CardRow::into_card).transpose()
    }

    async fn find_card_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<GiftCard>, StoreError> {
        let query = format!("SELECT {CARD_COLUMNS} FROM gift_card WHERE token_hash = $1");
        let row: Option<CardRow> = sqlx::query_as(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CardRow::into_card).transpose()
    }

    async fn mark_card_expired(&self, id: GiftCardId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE gift_card SET status = 'expired', updated_at = now() \
             WHERE id = $1 AND status IN ('active', 'partially_used')",
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish "already terminal" from "no such card".
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM gift_card WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }
        Ok(false)
    }

    async fn commit_redemption(
        &self,
        new: NewRedemption,
    ) -> Result<RedemptionRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialization point. Under concurrent requests exactly one
        // INSERT succeeds; the rest hit the uniqueness constraint.
        let record_row = sqlx::query(
            "INSERT INTO redemption_record \
                 (gift_card_id, redeemer_identity, redeemer_email, amount, disposition) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, redeemed_at",
        )
        .bind(new.gift_card_id.as_i64())
        .bind(new.redeemer_identity.as_str())
        .bind(new.redeemer_email.as_str())
        .bind(new.amount.cents())
        .bind(new.disposition)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "redemption record already exists"))?;

        let result = sqlx::query(
            "UPDATE gift_card \
             SET status = 'redeemed', remaining_amount = 0, redeemed_at = now(), \
                 redeemed_by = $2, updated_at = now() \
             WHERE id = $1 AND status = 'active' AND expires_at > now()",
        )
        .bind(new.gift_card_id.as_i64())
        .bind(new.redeemer_identity.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // The record insert must not survive a failed transition.
            let err =
                Self::diagnose_guard_failure(&mut tx, new.gift_card_id, None).await?;
            match err {
                // diagnose wrote the lazy-expiry update; keep it.
                StoreError::StatusGuard {
                    current: CardStatus::Expired,
                } => {
                    // Drop the redemption record but keep the expiry write:
                    // delete the record explicitly, then commit.
                    sqlx::query("DELETE FROM redemption_record WHERE gift_card_id = $1")
                        .bind(new.gift_card_id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                }
                _ => {
                    tx.rollback().await?;
                }
            }
            return Err(err);
        }

        tx.commit().await?;

        let id: i64 = record_row.try_get("id")?;
        let redeemed_at: DateTime<Utc> = record_row.try_get("redeemed_at")?;
        Ok(RedemptionRecord {
            id: RedemptionId::new(id),
            gift_card_id: new.gift_card_id,
            redeemer_identity: new.redeemer_identity,
            redeemer_email: new.redeemer_email,
            amount: new.amount,
            disposition: new.disposition,
            redeemed_at,
        })
    }

    async fn find_redemption(
        &self,
        gift_card_id: GiftCardId,
    ) -> Result<Option<RedemptionRecord>, StoreError> {
        let row: Option<RedemptionRow> = sqlx::query_as(
            "SELECT id, gift_card_id, redeemer_identity, redeemer_email, amount, \
                 disposition, redeemed_at \
             FROM redemption_record WHERE gift_card_id = $1",
        )
        .bind(gift_card_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RedemptionRow::into_record).transpose()
    }

    async fn link_card_wallet(
        &self,
        id: GiftCardId,
        wallet_id: WalletId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE gift_card SET wallet_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i64())
        .bind(wallet_id.as_i64())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_card_use(
        &self,
        id: GiftCardId,
        amount: Money,
        service_name: Option<String>,
        notes: Option<String>,
    ) -> Result<(CardUsage, GiftCard), StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE gift_card \
             SET remaining_amount = remaining_amount - $2, \
                 status = CASE WHEN remaining_amount - $2 = 0 \
                     THEN 'used'::card_status ELSE 'partially_used'::card_status END, \
                 updated_at = now() \
             WHERE id = $1 AND status IN ('active', 'partially_used') \
                 AND remaining_amount >= $2 AND expires_at > now() \
             RETURNING {CARD_COLUMNS}"
        );
        let row: Option<CardRow> = sqlx::query_as(&query)
            .bind(id.as_i64())
            .bind(amount.cents())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let err = Self::diagnose_guard_failure(&mut tx, id, Some(amount)).await?;
            match err {
                StoreError::StatusGuard {
                    current: CardStatus::Expired,
                } => tx.commit().await?,
                _ => tx.rollback().await?,
            }
            return Err(err);
        };
        let card = row.into_card()?;

        let usage_row = sqlx::query(
            "INSERT INTO card_usage (gift_card_id, amount, remaining_after, service_name, notes) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, created_at",
        )
        .bind(id.as_i64())
        .bind(amount.cents())
        .bind(card.remaining_amount.cents())
        .bind(&service_name)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let usage_id: i64 = usage_row.try_get("id")?;
        let created_at: DateTime<Utc> = usage_row.try_get("created_at")?;
        let usage = CardUsage {
            id: UsageId::new(usage_id),
            gift_card_id: id,
            amount,
            remaining_after: card.remaining_amount,
            service_name,
            notes,
            created_at,
        };
        Ok((usage, card))
    }

    async fn list_card_usage(&self, id: GiftCardId) -> Result<Vec<CardUsage>, StoreError> {
        let rows: Vec<UsageRow> = sqlx::query_as(
            "SELECT id, gift_card_id, amount, remaining_after, service_name, notes, created_at \
             FROM card_usage WHERE gift_card_id = $1 ORDER BY id ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UsageRow::into_usage).collect()
    }

    async fn cancel_card(
        &self,
        id: GiftCardId,
        reason: Option<String>,
    ) -> Result<GiftCard, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE gift_card \
             SET status = 'cancelled', cancel_reason = $2, updated_at = now() \
             WHERE id = $1 AND status IN ('pending', 'active', 'partially_used') \
             RETURNING {CARD_COLUMNS}"
        );
        let row: Option<CardRow> = sqlx::query_as(&query)
            .bind(id.as_i64())
            .bind(&reason)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let err = Self::diagnose_guard_failure(&mut tx, id, None).await?;
            match err {
                StoreError::StatusGuard {
                    current: CardStatus::Expired,
                } => tx.commit().await?,
                _ => tx.rollback().await?,
            }
            return Err(err);
        };
        tx.commit().await?;
        row.into_card()
    }

    async fn credit_wallet(
        &self,
        owner: &IdentityId,
        owner_email: &Email,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lazy wallet creation; a no-op when the identity already has one.
        sqlx::query(
            "INSERT INTO wallet (owner_identity, owner_email) VALUES ($1, $2) \
             ON CONFLICT (owner_identity) DO NOTHING",
        )
        .bind(owner.as_str())
        .bind(owner_email.as_str())
        .execute(&mut *tx)
        .await?;

        // Single atomic arithmetic update; the row lock it takes holds
        // through the ledger append below.
        let wallet_row = sqlx::query(
            "UPDATE wallet SET balance = balance + $2, updated_at = now() \
             WHERE owner_identity = $1 \
             RETURNING id, balance",
        )
        .bind(owner.as_str())
        .bind(amount.cents())
        .fetch_one(&mut *tx)
        .await?;

        let wallet_id: i64 = wallet_row.try_get("id")?;
        let balance: i64 = wallet_row.try_get("balance")?;

        let tx_id: i64 = sqlx::query_scalar(
            "INSERT INTO wallet_transaction \
                 (wallet_id, kind, amount, balance_after, description, reference_kind, reference_id) \
             VALUES ($1, 'credit', $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(wallet_id)
        .bind(amount.cents())
        .bind(balance)
        .bind(description)
        .bind(reference.kind_str())
        .bind(reference.ref_id())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerEntry {
            wallet_id: WalletId::new(wallet_id),
            balance: Money::from_cents(balance)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            transaction_id: TransactionId::new(tx_id),
        })
    }

    async fn debit_wallet(
        &self,
        owner: &IdentityId,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError> {
        let mut tx = self.pool.begin().await?;

        let wallet_row = sqlx::query(
            "UPDATE wallet SET balance = balance - $2, updated_at = now() \
             WHERE owner_identity = $1 AND balance >= $2 \
             RETURNING id, balance",
        )
        .bind(owner.as_str())
        .bind(amount.cents())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(wallet_row) = wallet_row else {
            tx.rollback().await?;
            let balance: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM wallet WHERE owner_identity = $1")
                    .bind(owner.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(balance.map_or(StoreError::NotFound, |cents| {
                StoreError::InsufficientBalance {
                    balance: Money::from_cents(cents.max(0)).unwrap_or(Money::ZERO),
                    requested: amount,
                }
            }));
        };

        let wallet_id: i64 = wallet_row.try_get("id")?;
        let balance: i64 = wallet_row.try_get("balance")?;

        let tx_id: i64 = sqlx::query_scalar(
            "INSERT INTO wallet_transaction \
                 (wallet_id, kind, amount, balance_after, description, reference_kind, reference_id) \
             VALUES ($1, 'debit', $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(wallet_id)
        .bind(amount.cents())
        .bind(balance)
        .bind(description)
        .bind(reference.kind_str())
        .bind(reference.ref_id())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerEntry {
            wallet_id: WalletId::new(wallet_id),
            balance: Money::from_cents(balance)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            transaction_id: TransactionId::new(tx_id),
        })
    }

    async fn get_wallet(&self, owner: &IdentityId) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(
            "SELECT id, owner_identity, owner_email, balance, created_at, updated_at \
             FROM wallet WHERE owner_identity = $1",
        )
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(WalletRow::into_wallet).transpose()
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT id, wallet_id, kind, amount, balance_after, description, \
                 reference_kind, reference_id, created_at \
             FROM wallet_transaction WHERE wallet_id = $1 ORDER BY id ASC",
        )
        .bind(wallet_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct CardRow {
    id: i64,
    code: String,
    token_hash: String,
    face_amount: i64,
    remaining_amount: i64,
    status: CardStatus,
    purchaser_name: Option<String>,
    purchaser_email: String,
    purchaser_phone: Option<String>,
    recipient_name: Option<String>,
    recipient_email: Option<String>,
    gift_message: Option<String>,
    is_gift: bool,
    purchased_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    token_expires_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
    redeemed_by: Option<String>,
    wallet_id: Option<i64>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CardRow {
    fn into_card(self) -> Result<GiftCard, StoreError> {
        let code = CardCode::parse(&self.code)
            .map_err(|e| StoreError::DataCorruption(format!("invalid card code in database: {e}")))?;
        let purchaser_email = Email::parse(&self.purchaser_email)
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;
        let recipient_email = self
            .recipient_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;
        let face_amount = Money::from_cents(self.face_amount)
            .map_err(|e| StoreError::DataCorruption(e.to_string()))?;
        let remaining_amount = Money::from_cents(self.remaining_amount)
            .map_err(|e| StoreError::DataCorruption(e.to_string()))?;

        Ok(GiftCard {
            id: GiftCardId::new(self.id),
            code,
            token_hash: self.token_hash,
            face_amount,
            remaining_amount,
            status: self.status,
            purchaser_name: self.purchaser_name,
            purchaser_email,
            purchaser_phone: self.purchaser_phone,
            recipient_name: self.recipient_name,
            recipient_email,
            gift_message: self.gift_message,
            is_gift: self.is_gift,
            purchased_at: self.purchased_at,
            expires_at: self.expires_at,
            token_expires_at: self.token_expires_at,
            redeemed_at: self.redeemed_at,
            redeemed_by: self.redeemed_by.map(IdentityId::new),
            wallet_id: self.wallet_id.map(WalletId::new),
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RedemptionRow {
    id: i64,
    gift_card_id: i64,
    redeemer_identity: String,
    redeemer_email: String,
    amount: i64,
    disposition: wildflower_core::Disposition,
    redeemed_at: DateTime<Utc>,
}

impl RedemptionRow {
    fn into_record(self) -> Result<RedemptionRecord, StoreError> {
        let redeemer_email = Email::parse(&self.redeemer_email)
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;
        Ok(RedemptionRecord {
            id: RedemptionId::new(self.id),
            gift_card_id: GiftCardId::new(self.gift_card_id),
            redeemer_identity: IdentityId::new(self.redeemer_identity),
            redeemer_email,
            amount: Money::from_cents(self.amount)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            disposition: self.disposition,
            redeemed_at: self.redeemed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: i64,
    owner_identity: String,
    owner_email: String,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_wallet(self) -> Result<Wallet, StoreError> {
        let owner_email = Email::parse(&self.owner_email)
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;
        Ok(Wallet {
            id: WalletId::new(self.id),
            owner_identity: IdentityId::new(self.owner_identity),
            owner_email,
            balance: Money::from_cents(self.balance)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    wallet_id: i64,
    kind: TransactionKind,
    amount: i64,
    balance_after: i64,
    description: String,
    reference_kind: String,
    reference_id: i64,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<WalletTransaction, StoreError> {
        let reference = TransactionReference::from_parts(&self.reference_kind, self.reference_id)
            .ok_or_else(|| {
                StoreError::DataCorruption(format!(
                    "unknown transaction reference kind: {}",
                    self.reference_kind
                ))
            })?;
        Ok(WalletTransaction {
            id: TransactionId::new(self.id),
            wallet_id: WalletId::new(self.wallet_id),
            kind: self.kind,
            amount: Money::from_cents(self.amount)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            balance_after: Money::from_cents(self.balance_after)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            description: self.description,
            reference,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: i64,
    gift_card_id: i64,
    amount: i64,
    remaining_after: i64,
    service_name: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl UsageRow {
    fn into_usage(self) -> Result<CardUsage, StoreError> {
        Ok(CardUsage {
            id: UsageId::new(self.id),
            gift_card_id: GiftCardId::new(self.gift_card_id),
            amount: Money::from_cents(self.amount)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            remaining_after: Money::from_cents(self.remaining_after)
                .map_err(|e| StoreError::DataCorruption(e.to_string()))?,
            service_name: self.service_name,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}
