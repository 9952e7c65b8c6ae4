//! Integration tests for the Wildflower gift-card service.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p wildflower-integration-tests
//! ```
//!
//! The suites run against the in-memory storage backend, which carries
//! the same atomicity contract as the Postgres backend; the concurrency
//! properties (exactly-once redemption, lost-update-free credits) are
//! exercised with real task-level parallelism.
//!
//! # Test Categories
//!
//! - `redemption_protocol` - token validation, identity flows, and the
//!   exactly-once guarantee under 50 concurrent executions
//! - `wallet_ledger` - reconciliation invariant under concurrent and
//!   mixed activity
//! - `card_lifecycle` - conservation of value through partial use,
//!   expiry monotonicity, cancellation
//!
//! This crate's library is the shared fixture: an engine wired to the
//! in-memory backend plus helpers for issuing cards with controlled
//! expiry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::SecretString;
use url::Url;

use wildflower_core::{CardStatus, Email, Money};
use wildflower_giftcards::config::GiftcardsConfig;
use wildflower_giftcards::db::{MemoryStore, Store};
use wildflower_giftcards::models::{GiftCard, NewGiftCard};
use wildflower_giftcards::services::tokens;
use wildflower_giftcards::services::{
    RecordingNotifier, RedemptionService, StaticDirectory, VerifyThrottle,
};

/// An engine instance wired to the in-memory backend.
pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub throttle: Arc<VerifyThrottle>,
    pub config: GiftcardsConfig,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    /// Create a fresh engine with a generous verification throttle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            directory: Arc::new(StaticDirectory::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            throttle: Arc::new(VerifyThrottle::new(10_000)),
            config: test_config(),
        }
    }

    /// Borrow a redemption service over this engine.
    #[must_use]
    pub fn redemption(&self) -> RedemptionService<'_> {
        RedemptionService::new(
            self.store.as_ref(),
            self.directory.as_ref(),
            self.notifier.as_ref(),
            self.throttle.as_ref(),
        )
    }

    /// Issue an active card directly through the store with a controlled
    /// expiry; returns the card and the plaintext token.
    ///
    /// # Panics
    ///
    /// Panics on invalid fixture input.
    pub async fn issue_card(
        &self,
        face_cents: i64,
        expires_in: Duration,
        recipient: Option<&str>,
    ) -> (GiftCard, String) {
        self.issue_card_with_status(face_cents, expires_in, recipient, CardStatus::Active)
            .await
    }

    /// Like [`Self::issue_card`] with an explicit initial status.
    ///
    /// # Panics
    ///
    /// Panics on invalid fixture input.
    #[allow(clippy::unwrap_used)]
    pub async fn issue_card_with_status(
        &self,
        face_cents: i64,
        expires_in: Duration,
        recipient: Option<&str>,
        status: CardStatus,
    ) -> (GiftCard, String) {
        let token = tokens::generate_token();
        let now = Utc::now();
        let card = self
            .store
            .create_card(NewGiftCard {
                code: tokens::generate_code("WF"),
                token_hash: token.hash,
                face_amount: Money::from_cents(face_cents).unwrap(),
                status,
                purchaser_name: Some("Dana Buyer".to_string()),
                purchaser_email: Email::parse("dana@example.com").unwrap(),
                purchaser_phone: None,
                recipient_name: None,
                recipient_email: recipient.map(|r| Email::parse(r).unwrap()),
                gift_message: None,
                is_gift: recipient.is_some(),
                purchased_at: now,
                expires_at: now + expires_in,
                token_expires_at: now + Duration::hours(48),
            })
            .await
            .unwrap();
        (card, token.plaintext)
    }
}

/// A config suitable for tests; never touches a real database.
#[must_use]
#[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
pub fn test_config() -> GiftcardsConfig {
    GiftcardsConfig {
        database_url: SecretString::from("postgres://localhost/unused"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: Url::parse("https://wildflowerdayspa.test").unwrap(),
        code_prefix: "WF".to_string(),
        card_validity_months: 24,
        token_ttl_hours: 48,
        verify_attempts_per_minute: 10_000,
        sentry_dsn: None,
        sentry_environment: None,
    }
}
