//! Wallet ledger operations.
//!
//! A wallet is a cached projection of its append-only ledger. The only
//! code paths that move money are [`WalletService::credit`] and
//! [`WalletService::debit`], and each is one atomic storage operation -
//! balance update and ledger append commit together or not at all.
//! Serialization under concurrency is the storage layer's job (row lock
//! or single-writer mutex), never a read-modify-write here.

mod error;

pub use error::WalletError;

use tracing::instrument;

use wildflower_core::{Email, IdentityId, Money};

use crate::db::Store;
use crate::models::{LedgerEntry, TransactionReference, Wallet, WalletTransaction};

/// Wallet ledger service.
pub struct WalletService<'a> {
    store: &'a dyn Store,
}

impl<'a> WalletService<'a> {
    /// Create a new wallet service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Credit an identity's wallet, creating it on first credit.
    ///
    /// Returns the committed balance and transaction id for confirmation.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::InvalidAmount` for a non-positive amount.
    #[instrument(skip(self, owner_email, description), fields(owner = %owner, amount = %amount))]
    pub async fn credit(
        &self,
        owner: &IdentityId,
        owner_email: &Email,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount);
        }
        let entry = self
            .store
            .credit_wallet(owner, owner_email, amount, reference, description)
            .await?;
        tracing::info!(
            wallet_id = %entry.wallet_id,
            balance = %entry.balance,
            transaction_id = %entry.transaction_id,
            "wallet credited"
        );
        Ok(entry)
    }

    /// Debit an identity's wallet.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::InsufficientBalance` if the balance cannot
    /// cover `amount`; no partial application occurs.
    #[instrument(skip(self, description), fields(owner = %owner, amount = %amount))]
    pub async fn debit(
        &self,
        owner: &IdentityId,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount);
        }
        let entry = self
            .store
            .debit_wallet(owner, amount, reference, description)
            .await?;
        tracing::info!(
            wallet_id = %entry.wallet_id,
            balance = %entry.balance,
            transaction_id = %entry.transaction_id,
            "wallet debited"
        );
        Ok(entry)
    }

    /// Fetch an identity's wallet.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::NotFound` if no wallet exists yet.
    pub async fn wallet(&self, owner: &IdentityId) -> Result<Wallet, WalletError> {
        self.store
            .get_wallet(owner)
            .await?
            .ok_or(WalletError::NotFound)
    }

    /// List an identity's ledger, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::NotFound` if no wallet exists yet.
    pub async fn history(&self, owner: &IdentityId) -> Result<Vec<WalletTransaction>, WalletError> {
        let wallet = self.wallet(owner).await?;
        Ok(self.store.list_wallet_transactions(wallet.id).await?)
    }

    /// Check the reconciliation invariant for an identity's wallet:
    /// every `balance_after` continues the chain from its predecessor,
    /// and the cached balance equals both the final `balance_after` and
    /// the signed running sum.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::Inconsistent` naming the first violation.
    pub async fn verify_ledger(&self, owner: &IdentityId) -> Result<(), WalletError> {
        let wallet = self.wallet(owner).await?;
        let transactions = self.store.list_wallet_transactions(wallet.id).await?;

        let mut running = 0_i64;
        for tx in &transactions {
            if !tx.amount.is_positive() {
                return Err(WalletError::Inconsistent {
                    wallet_id: wallet.id,
                    detail: format!("transaction {} has non-positive amount", tx.id),
                });
            }
            running += tx.signed_amount();
            if tx.balance_after.cents() != running {
                return Err(WalletError::Inconsistent {
                    wallet_id: wallet.id,
                    detail: format!(
                        "transaction {} snapshots {} but the chain says {}",
                        tx.id,
                        tx.balance_after.cents(),
                        running
                    ),
                });
            }
        }

        if wallet.balance.cents() != running {
            return Err(WalletError::Inconsistent {
                wallet_id: wallet.id,
                detail: format!(
                    "cached balance {} does not equal ledger sum {}",
                    wallet.balance.cents(),
                    running
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wildflower_core::GiftCardId;

    use crate::db::MemoryStore;

    fn owner() -> IdentityId {
        IdentityId::new("usr_1")
    }

    fn email() -> Email {
        Email::parse("owner@example.com").unwrap()
    }

    fn gift_card_ref() -> TransactionReference {
        TransactionReference::GiftCard(GiftCardId::new(1))
    }

    #[tokio::test]
    async fn test_credit_creates_wallet_lazily() {
        let store = MemoryStore::new();
        let service = WalletService::new(&store);

        assert!(matches!(
            service.wallet(&owner()).await.unwrap_err(),
            WalletError::NotFound
        ));

        let entry = service
            .credit(&owner(), &email(), Money::from_cents(20_000).unwrap(), gift_card_ref(), "Gift card redeemed")
            .await
            .unwrap();
        assert_eq!(entry.balance.cents(), 20_000);

        let wallet = service.wallet(&owner()).await.unwrap();
        assert_eq!(wallet.balance.cents(), 20_000);
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive() {
        let store = MemoryStore::new();
        let service = WalletService::new(&store);
        let err = service
            .credit(&owner(), &email(), Money::ZERO, gift_card_ref(), "no-op")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_ledger_chain_reconciles_through_mixed_activity() {
        let store = MemoryStore::new();
        let service = WalletService::new(&store);

        service
            .credit(&owner(), &email(), Money::from_cents(10_000).unwrap(), gift_card_ref(), "credit")
            .await
            .unwrap();
        service
            .debit(&owner(), Money::from_cents(2_500).unwrap(), gift_card_ref(), "debit")
            .await
            .unwrap();
        service
            .credit(&owner(), &email(), Money::from_cents(500).unwrap(), gift_card_ref(), "credit")
            .await
            .unwrap();

        service.verify_ledger(&owner()).await.unwrap();

        let history = service.history(&owner()).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().balance_after.cents(), 8_000);
        assert_eq!(service.wallet(&owner()).await.unwrap().balance.cents(), 8_000);
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_fails_cleanly() {
        let store = MemoryStore::new();
        let service = WalletService::new(&store);

        service
            .credit(&owner(), &email(), Money::from_cents(1_000).unwrap(), gift_card_ref(), "credit")
            .await
            .unwrap();
        let err = service
            .debit(&owner(), Money::from_cents(1_001).unwrap(), gift_card_ref(), "debit")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));

        // No partial application: balance and ledger untouched.
        service.verify_ledger(&owner()).await.unwrap();
        assert_eq!(service.history(&owner()).await.unwrap().len(), 1);
    }
}
