//! Card issuance and staff-facing card operations.
//!
//! Issuance is the entry point the external purchase-completion step
//! calls once payment has cleared; use and cancellation are the staff
//! counter operations. Everything here consumes the card directly -
//! in-store use decrements the card, not the wallet ledger.

mod error;

pub use error::CardError;

use chrono::{Duration, Months, Utc};
use tracing::instrument;

use wildflower_core::{CardStatus, GiftCardId, Money};

use crate::config::GiftcardsConfig;
use crate::db::{Store, StoreError};
use crate::models::{CardUsage, GiftCard, NewGiftCard, PurchaseDetails};
use crate::services::notify::{Notification, Notifier};
use crate::services::tokens;

/// Maximum validity window staff can request, in months.
const MAX_VALIDITY_MONTHS: u32 = 60;

/// Attempts at allocating a unique code before giving up.
const CODE_ATTEMPTS: u32 = 3;

/// A freshly issued card plus its one-time redemption link.
///
/// The link embeds the plaintext token. It exists here and in the
/// `CardIssued` event, and nowhere else - the store keeps only the hash.
#[derive(Debug, Clone)]
pub struct IssuedCard {
    /// The stored card.
    pub card: GiftCard,
    /// Redemption link for the notification email.
    pub redemption_link: String,
}

/// Card service.
pub struct CardService<'a> {
    store: &'a dyn Store,
    notifier: &'a dyn Notifier,
    config: &'a GiftcardsConfig,
}

impl<'a> CardService<'a> {
    /// Create a new card service.
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        notifier: &'a dyn Notifier,
        config: &'a GiftcardsConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Issue an active gift card from completed purchase details.
    ///
    /// Generates the human-readable code and the one-time token, persists
    /// the card with only the token's hash, and emits a `CardIssued`
    /// event carrying the redemption link.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidAmount` for a non-positive face value,
    /// `CardError::InvalidValidity` for an out-of-policy expiry window.
    #[instrument(skip(self, details), fields(amount = %details.amount))]
    pub async fn activate_gift_card(
        &self,
        details: PurchaseDetails,
    ) -> Result<IssuedCard, CardError> {
        if !details.amount.is_positive() {
            return Err(CardError::InvalidAmount);
        }
        let months = details
            .validity_months
            .unwrap_or(self.config.card_validity_months);
        if months == 0 || months > MAX_VALIDITY_MONTHS {
            return Err(CardError::InvalidValidity { months });
        }

        let now = Utc::now();
        let expires_at = now
            .checked_add_months(Months::new(months))
            .ok_or(CardError::InvalidValidity { months })?;
        let token_expires_at = now + Duration::hours(i64::from(self.config.token_ttl_hours));

        // Collisions are negligible but not impossible; the storage
        // uniqueness constraint is the arbiter, so retry a fresh draw.
        let mut attempt = 0;
        let (card, token) = loop {
            let code = tokens::generate_code(&self.config.code_prefix);
            let token = tokens::generate_token();
            let new = NewGiftCard {
                code,
                token_hash: token.hash.clone(),
                face_amount: details.amount,
                status: CardStatus::Active,
                purchaser_name: details.purchaser_name.clone(),
                purchaser_email: details.purchaser_email.clone(),
                purchaser_phone: details.purchaser_phone.clone(),
                recipient_name: details.recipient_name.clone(),
                recipient_email: details.recipient_email.clone(),
                gift_message: details.gift_message.clone(),
                is_gift: details.is_gift,
                purchased_at: now,
                expires_at,
                token_expires_at,
            };
            match self.store.create_card(new).await {
                Ok(card) => break (card, token),
                Err(StoreError::Conflict(_)) if attempt + 1 < CODE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => return Err(CardError::CodeAllocation),
                Err(e) => return Err(e.into()),
            }
        };

        let redemption_link = self.config.redemption_link(&token.plaintext);
        self.notifier.notify(Notification::CardIssued {
            gift_card_id: card.id,
            code: card.code.clone(),
            amount: card.face_amount,
            purchaser_email: card.purchaser_email.clone(),
            recipient_email: card.recipient_email.clone(),
            recipient_name: card.recipient_name.clone(),
            gift_message: card.gift_message.clone(),
            redemption_link: redemption_link.clone(),
        });

        tracing::info!(gift_card_id = %card.id, code = %card.code, "gift card issued");
        Ok(IssuedCard {
            card,
            redemption_link,
        })
    }

    /// Fetch a card, lazily expiring it when its window has passed.
    ///
    /// # Errors
    ///
    /// Returns `CardError::NotFound` if the card does not exist.
    pub async fn get_card(&self, id: GiftCardId) -> Result<GiftCard, CardError> {
        let mut card = self
            .store
            .get_card(id)
            .await?
            .ok_or(CardError::NotFound)?;
        if card.should_expire(Utc::now()) {
            // Best-effort write; reporting the expired state must not
            // depend on it succeeding.
            match self.store.mark_card_expired(id).await {
                Ok(_) => {}
                Err(e) => tracing::warn!(gift_card_id = %id, error = %e, "lazy expiry write failed"),
            }
            card.status = CardStatus::Expired;
        }
        Ok(card)
    }

    /// Record staff-witnessed in-store consumption of card value.
    ///
    /// # Errors
    ///
    /// Returns `CardError::WrongStatus` unless the card is `active` or
    /// `partially_used`, `CardError::InsufficientValue` if `amount`
    /// exceeds the remaining value.
    #[instrument(skip(self, service_name, notes), fields(gift_card_id = %id, amount = %amount))]
    pub async fn record_use(
        &self,
        id: GiftCardId,
        amount: Money,
        service_name: Option<String>,
        notes: Option<String>,
    ) -> Result<(CardUsage, GiftCard), CardError> {
        if !amount.is_positive() {
            return Err(CardError::InvalidAmount);
        }
        let (usage, card) = self
            .store
            .record_card_use(id, amount, service_name, notes)
            .await?;
        tracing::info!(
            gift_card_id = %id,
            remaining = %card.remaining_amount,
            status = %card.status,
            "in-store use recorded"
        );
        Ok((usage, card))
    }

    /// List a card's in-store usage history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `CardError::NotFound` if the card does not exist.
    pub async fn usage_history(&self, id: GiftCardId) -> Result<Vec<CardUsage>, CardError> {
        if self.store.get_card(id).await?.is_none() {
            return Err(CardError::NotFound);
        }
        Ok(self.store.list_card_usage(id).await?)
    }

    /// Void a card. Irreversible; never reverses an already-completed
    /// wallet credit.
    ///
    /// # Errors
    ///
    /// Returns `CardError::WrongStatus` if the card is already terminal.
    #[instrument(skip(self, reason), fields(gift_card_id = %id))]
    pub async fn cancel(&self, id: GiftCardId, reason: Option<String>) -> Result<(), CardError> {
        let card = self.store.cancel_card(id, reason).await?;
        tracing::info!(gift_card_id = %card.id, code = %card.code, "gift card cancelled");
        Ok(())
    }
}
