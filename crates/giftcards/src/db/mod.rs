//! Storage layer for the gift-card engine.
//!
//! The [`Store`] trait is the storage contract. Every correctness
//! guarantee the engine makes - exactly-once redemption, lost-update-free
//! balance mutation, guarded status transitions - is owed by the backend,
//! not by in-process locks: the engine is invoked by many independent
//! short-lived request handlers and keeps no authoritative state in
//! memory.
//!
//! Backends:
//! - [`postgres::PgStore`] - production backend; uniqueness constraints
//!   and guarded/atomic UPDATEs carry the guarantees.
//! - [`memory::MemoryStore`] - in-process backend with the same contract,
//!   used by the test suites and local development.
//!
//! # Migrations
//!
//! Migrations live in `crates/giftcards/migrations/` and run via:
//! ```bash
//! cargo run -p wildflower-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use wildflower_core::{CardStatus, Email, GiftCardId, IdentityId, Money, WalletId};

use crate::models::{
    CardUsage, GiftCard, LedgerEntry, NewGiftCard, NewRedemption, RedemptionRecord,
    TransactionReference, Wallet, WalletTransaction,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The addressed row does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write. For the redemption
    /// record this is the exactly-once serialization point.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A guarded status transition found the card in a state that does
    /// not permit it.
    #[error("card status {current} does not permit this operation")]
    StatusGuard {
        /// The status the card was actually in.
        current: CardStatus,
    },

    /// In-store use requested more than the card has left.
    #[error("insufficient card value: {remaining} remaining, {requested} requested")]
    InsufficientValue {
        /// Remaining card value.
        remaining: Money,
        /// Amount requested.
        requested: Money,
    },

    /// Wallet debit requested more than the balance holds.
    #[error("insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance {
        /// Current wallet balance.
        balance: Money,
        /// Amount requested.
        requested: Money,
    },

    /// A stored value failed domain validation on read.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// The storage contract for cards, redemptions, wallets, and ledgers.
///
/// Mutating operations are atomic per call: either every row named in the
/// operation's contract is written, or none is. Guarded operations
/// re-check their preconditions *inside* the atomic unit, so callers may
/// treat a success as proof the precondition held at commit time.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Gift cards ---

    /// Insert a new gift card.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the code or token hash already
    /// exists (the caller regenerates and retries).
    async fn create_card(&self, new: NewGiftCard) -> Result<GiftCard, StoreError>;

    /// Fetch a card by id.
    async fn get_card(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError>;

    /// Fetch a card by the hash of its redemption token.
    async fn find_card_by_token_hash(&self, token_hash: &str)
    -> Result<Option<GiftCard>, StoreError>;

    /// Lazily transition a card to `expired`.
    ///
    /// Idempotent: returns `true` if this call performed the transition,
    /// `false` if the card was already in a state that does not expire
    /// (including already being `expired`).
    async fn mark_card_expired(&self, id: GiftCardId) -> Result<bool, StoreError>;

    /// Atomically record a redemption: insert the [`RedemptionRecord`]
    /// and transition the card to `redeemed` with zero remaining value,
    /// as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a record already exists for
    /// this card - produced by the uniqueness constraint itself, and the
    /// signal the caller surfaces as `AlreadyRedeemed`. Returns
    /// [`StoreError::StatusGuard`] (with nothing written) if the card is
    /// not `active` at commit time.
    async fn commit_redemption(&self, new: NewRedemption)
    -> Result<RedemptionRecord, StoreError>;

    /// Fetch the redemption record for a card, if one exists.
    async fn find_redemption(
        &self,
        gift_card_id: GiftCardId,
    ) -> Result<Option<RedemptionRecord>, StoreError>;

    /// Link a redeemed card to the wallet its value landed in. Metadata
    /// only; failure does not undo a committed redemption.
    async fn link_card_wallet(
        &self,
        id: GiftCardId,
        wallet_id: WalletId,
    ) -> Result<(), StoreError>;

    /// Atomically consume in-store value: decrement `remaining_amount`,
    /// set status to `used` (at zero) or `partially_used`, and append a
    /// [`CardUsage`] row, as one unit. The status, amount, and expiry
    /// guards are evaluated inside the atomic unit.
    async fn record_card_use(
        &self,
        id: GiftCardId,
        amount: Money,
        service_name: Option<String>,
        notes: Option<String>,
    ) -> Result<(CardUsage, GiftCard), StoreError>;

    /// List the in-store usage history of a card, oldest first.
    async fn list_card_usage(&self, id: GiftCardId) -> Result<Vec<CardUsage>, StoreError>;

    /// Void a card. Guarded: only `pending`, `active`, or
    /// `partially_used` cards can be cancelled.
    async fn cancel_card(
        &self,
        id: GiftCardId,
        reason: Option<String>,
    ) -> Result<GiftCard, StoreError>;

    // --- Wallet ledger ---

    /// Atomically credit a wallet: create the wallet if the identity has
    /// none, apply `balance = balance + amount` as a single storage-side
    /// arithmetic update, and append the ledger transaction with the
    /// resulting `balance_after`, as one unit. Concurrent credits to the
    /// same wallet serialize on the wallet row; no two credits can
    /// observe the same prior balance.
    async fn credit_wallet(
        &self,
        owner: &IdentityId,
        owner_email: &Email,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError>;

    /// Atomically debit a wallet. Same shape as `credit_wallet`, with the
    /// `balance >= amount` guard evaluated inside the atomic update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InsufficientBalance`] if the guard fails,
    /// [`StoreError::NotFound`] if the identity has no wallet.
    async fn debit_wallet(
        &self,
        owner: &IdentityId,
        amount: Money,
        reference: TransactionReference,
        description: &str,
    ) -> Result<LedgerEntry, StoreError>;

    /// Fetch a wallet by owning identity.
    async fn get_wallet(&self, owner: &IdentityId) -> Result<Option<Wallet>, StoreError>;

    /// List a wallet's ledger, oldest first.
    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, StoreError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
