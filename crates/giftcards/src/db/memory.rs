//! In-memory storage backend.
//!
//! Implements the [`Store`] contract over a single mutex so every
//! guarded operation is atomic exactly as the Postgres backend's
//! transactions are. The test suites (including the concurrency property
//! tests) and local development run against this backend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use async_trait::async_trait;

use wildflower_core::{CardStatus, Email, GiftCardId, IdentityId, Money, RedemptionId, TransactionId, TransactionKind, UsageId, WalletId};

use super::{Store, StoreError};
use crate::models::{
    CardUsage, GiftCard, LedgerEntry, NewGiftCard, NewRedemption, RedemptionRecord,
    TransactionReference, Wallet, WalletTransaction,
};

#[derive(Default)]
struct Inner {
    cards: HashMap<GiftCardId, GiftCard>,
    redemptions: HashMap<GiftCardId, RedemptionRecord>,
    wallets: HashMap<IdentityId, Wallet>,
    transactions: Vec<WalletTransaction>,
    usage: Vec<CardUsage>,
    next_card_id: i64,
    next_redemption_id: i64,
    next_wallet_id: i64,
    next_transaction_id: i64,
    next_usage_id: i64,
}

impl Inner {
    fn next_card(&mut self) -> GiftCardId {
        self.next_card_id += 1;
        GiftCardId::new(self.next_card_id)
    }

    fn next_redemption(&mut self) -> RedemptionId {
        self.next_redemption_id += 1;
        RedemptionId::new(self.next_redemption_id)
    }

    fn next_wallet(&mut self) -> WalletId {
        self.next_wallet_id += 1;
        WalletId::new(self.next_wallet_id)
    }

    fn next_transaction(&mut self) -> TransactionId {
        self.next_transaction_id += 1;
        TransactionId::new(self.next_transaction_id)
    }

    fn next_usage(&mut self) -> UsageId {
        self.next_usage_id += 1;
        UsageId::new(self.next_usage_id)
    }
}

/// In-process [`Store`] backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_card(&self, new: NewGiftCard) -> Result<GiftCard, StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.cards.values().any(|c| c.code == new.code) {
            return Err(StoreError::Conflict("card code already exists".into()));
        }
        if inner.cards.values().any(|c| c.token_hash == new.token_hash) {
            return Err(StoreError::Conflict("token hash already exists".into()));
        }

        let now = Utc::now();
        let id = inner.next_card();
        let card = GiftCard {
            id,
            code: new.code,
            token_hash: new.token_hash,
            face_amount: new.face_amount,
            remaining_amount: new.face_amount,
            status: new.status,
            purchaser_name: new.purchaser_name,
            purchaser_email: new.purchaser_email,
            purchaser_phone: new.purchaser_phone,
            recipient_name: new.recipient_name,
            recipient_email: new.recipient_email,
            gift_message: new.gift_message,
            is_gift: new.is_gift,
            purchased_at: new.purchased_at,
            expires_at: new.expires_at,
            token_expires_at: new.token_expires_at,
            redeemed_at: None,
            redeemed_by: None,
            wallet_id: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.cards.insert(id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.cards.get(&id).cloned())
    }

    async fn find_card_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<GiftCard>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.cards.values().find(|c| c.token_hash == token_hash).cloned())
    }

    async fn mark_card_expired(&self, id: GiftCardId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let card = inner.cards.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !card.status.allows_expiry() {
            return Ok(false);
        }
        card.status = CardStatus::Expired;
        card.updated_at = Utc::now();
        Ok(true)
    }

    async fn commit_redemption(
        &self,
        new: NewRedemption,
    ) -> Result<RedemptionRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Serialization point: the per-card uniqueness of the record.
        if inner.redemptions.contains_key(&new.gift_card_id) {
            return Err(StoreError::Conflict("redemption record already exists".into()));
        }

        let card = inner
            .cards
            .get_mut(&new.gift_card_id)
            .ok_or(StoreError::NotFound)?;

        // Guards re-checked inside the atomic unit. A card past its
        // expiry can only move to `expired`, never to `redeemed`.
        if card.should_expire(now) {
            card.status = CardStatus::Expired;
            card.updated_at = now;
            return Err(StoreError::StatusGuard {
                current: CardStatus::Expired,
            });
        }
        if !card.status.is_redeemable() {
            return Err(StoreError::StatusGuard {
                current: card.status,
            });
        }

        card.status = CardStatus::Redeemed;
        card.remaining_amount = Money::ZERO;
        card.redeemed_at = Some(now);
        card.redeemed_by = Some(new.redeemer_identity.clone());
        card.updated_at = now;

        let id = inner.next_redemption();
        let record = RedemptionRecord {
            id,
            gift_card_id: new.gift_card_id,
            redeemer_identity: new.redeemer_identity,
            redeemer_email: new.redeemer_email,
            amount: new.amount,
            disposition: new.disposition,
            redeemed_at: now,
        };
        inner.redemptions.insert(new.gift_card_id, record.clone());
        Ok(record)
    }

    async fn find_redemption(
        &self,
        gift_card_id: GiftCardId,
    ) -> Result<Option<RedemptionRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.redemptions.get(&gift_card_id).cloned())
    }

    async fn link_card_wallet(
        &self,
        id: GiftCardId,
        wallet_id: WalletId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let card = inner.cards.get_mut(&id).ok_or(StoreError::NotFound)?;
        card.wallet_id = Some(wallet_id);
        card.updated_at = Utc::now();
        Ok(())
    }

    async fn record_card_use(
        &self,
        id: GiftCardId,
        amount: Money,
        service_name: Option<String>,
        notes: Option<String>,
    ) -> Result<(CardUsage, GiftCard), StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let card = inner.cards.get_mut(&id).ok_or(StoreError::NotFound)?;

        if card.should_expire(now) {
            card.status = CardStatus::Expired;
            card.updated_at = now;
            return Err(StoreError::StatusGuard {
                current: CardStatus::Expired,
            });
        }
        if !card.status.allows_use() {
            // A card exhausted by use has nothing left; that reads as
            // insufficiency, not as a lifecycle violation.
            if card.status == CardStatus::Used {
                return Err(StoreError::InsufficientValue {
                    remaining: card.remaining_amount,
                    requested: amount,
                });
            }
            return Err(StoreError::StatusGuard {
                current: card.status,
            });
        }
        let remaining = card.remaining_amount.checked_sub(amount).map_err(|_| {
            StoreError::InsufficientValue {
                remaining: card.remaining_amount,
                requested: amount,
            }
        })?;

        card.remaining_amount = remaining;
        card.status = if remaining.is_zero() {
            CardStatus::Used
        } else {
            CardStatus::PartiallyUsed
        };
        card.updated_at = now;
        let card = card.clone();

        let usage_id = inner.next_usage();
        let usage = CardUsage {
            id: usage_id,
            gift_card_id: id,
            amount,
            remaining_after: remaining,
            service_name,
            notes,
            created_at: now,
        };
        inner.usage.push(usage.clone());
        Ok((usage, card))
    }

    async fn list_card_usage(&self, id: GiftCardId) -> Result<Vec<CardUsage>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .usage
            .iter()
            .filter(|u| u.gift_card_id == id)
            .cloned()
            .collect())
    }

    async fn cancel_card(
        &self,
        id: GiftCardId,
        reason: Option<String>,
    ) -> Result<GiftCard, StoreError> {
        let mut inner = self.inner.lock().await;
        let card = inner.cards.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !card.status.allows_cancel() {
            return Err(StoreError::StatusGuard {
                current: card.status,
            });
        }
        card.status = CardStatus::Cancelled;
        card.cancel_reason = reason;
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    async fn credit_wallet(
        &self,
        owner: &IdentityId,
        owner_email: &Email,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let wallet_id = match inner.wallets.get(owner) {
            Some(wallet) => wallet.id,
            None => {
                let id = inner.next_wallet();
                inner.wallets.insert(
                    owner.clone(),
                    Wallet {
                        id,
                        owner_identity: owner.clone(),
                        owner_email: owner_email.clone(),
                        balance: Money::ZERO,
                        created_at: now,
                        updated_at: now,
                    },
                );
                id
            }
        };

        let transaction_id = inner.next_transaction();
        let wallet = inner
            .wallets
            .get_mut(owner)
            .ok_or(StoreError::NotFound)?;
        let new_balance = wallet
            .balance
            .checked_add(amount)
            .map_err(|e| StoreError::DataCorruption(e.to_string()))?;
        wallet.balance = new_balance;
        wallet.updated_at = now;

        inner.transactions.push(WalletTransaction {
            id: transaction_id,
            wallet_id,
            kind: TransactionKind::Credit,
            amount,
            balance_after: new_balance,
            description: description.to_owned(),
            reference,
            created_at: now,
        });

        Ok(LedgerEntry {
            wallet_id,
            balance: new_balance,
            transaction_id,
        })
    }

    async fn debit_wallet(
        &self,
        owner: &IdentityId,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let transaction_id = inner.next_transaction();
        let wallet = inner.wallets.get_mut(owner).ok_or(StoreError::NotFound)?;
        let wallet_id = wallet.id;
        let new_balance = wallet.balance.checked_sub(amount).map_err(|_| {
            StoreError::InsufficientBalance {
                balance: wallet.balance,
                requested: amount,
            }
        })?;
        wallet.balance = new_balance;
        wallet.updated_at = now;

        inner.transactions.push(WalletTransaction {
            id: transaction_id,
            wallet_id,
            kind: TransactionKind::Debit,
            amount,
            balance_after: new_balance,
            description: description.to_owned(),
            reference,
            created_at: now,
        });

        Ok(LedgerEntry {
            wallet_id,
            balance: new_balance,
            transaction_id,
        })
    }

    async fn get_wallet(&self, owner: &IdentityId) -> Result<Option<Wallet>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.wallets.get(owner).cloned())
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}
