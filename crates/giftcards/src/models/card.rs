//! Gift-card domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wildflower_core::{CardCode, CardStatus, Email, GiftCardId, IdentityId, Money, UsageId, WalletId};

/// A gift card (domain type).
///
/// `status` is the single authoritative lifecycle record. `redeemed_at`,
/// `redeemed_by` and `wallet_id` are metadata of the `Redeemed` state and
/// are never consulted to decide whether a card is redeemable.
#[derive(Debug, Clone)]
pub struct GiftCard {
    /// Unique card ID.
    pub id: GiftCardId,
    /// Human-readable code, e.g. `WF-AB3D-9KQX`.
    pub code: CardCode,
    /// Hex SHA-256 digest of the one-time redemption token.
    /// The plaintext is never stored and never leaves issuance.
    pub token_hash: String,
    /// Face value at purchase, in cents.
    pub face_amount: Money,
    /// Value not yet consumed in store, in cents.
    pub remaining_amount: Money,
    /// Lifecycle status.
    pub status: CardStatus,
    /// Purchaser display name.
    pub purchaser_name: Option<String>,
    /// Purchaser contact email.
    pub purchaser_email: Email,
    /// Purchaser contact phone.
    pub purchaser_phone: Option<String>,
    /// Recipient display name (gift cards).
    pub recipient_name: Option<String>,
    /// Recipient email the card is bound to, if any. A bound card can only
    /// be redeemed with a matching address.
    pub recipient_email: Option<Email>,
    /// Gift message from the purchaser.
    pub gift_message: Option<String>,
    /// Whether the card was bought as a gift for someone else.
    pub is_gift: bool,
    /// When payment cleared.
    pub purchased_at: DateTime<Utc>,
    /// When the card itself stops being redeemable or usable.
    pub expires_at: DateTime<Utc>,
    /// When the redemption *token* stops working. Independent of (and much
    /// shorter than) the card's own expiry.
    pub token_expires_at: DateTime<Utc>,
    /// When the redemption protocol consumed the card.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Identity that redeemed the card.
    pub redeemed_by: Option<IdentityId>,
    /// Wallet credited by a `wallet`-disposition redemption.
    pub wallet_id: Option<WalletId>,
    /// Staff-supplied reason for a cancellation.
    pub cancel_reason: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl GiftCard {
    /// Whether lazy expiry should fire for this card at `now`.
    #[must_use]
    pub fn should_expire(&self, now: DateTime<Utc>) -> bool {
        self.status.allows_expiry() && now > self.expires_at
    }

    /// Whether the redemption token's own window has elapsed at `now`.
    #[must_use]
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.token_expires_at
    }

    /// Redact the card into the shape returned to redemption callers.
    /// Never includes token material.
    #[must_use]
    pub fn summary(&self) -> GiftCardSummary {
        GiftCardSummary {
            id: self.id,
            code: self.code.clone(),
            face_amount: self.face_amount,
            remaining_amount: self.remaining_amount,
            expires_at: self.expires_at,
            recipient_email: self.recipient_email.clone(),
            is_gift: self.is_gift,
        }
    }
}

/// The public projection of a gift card returned by `validate_token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCardSummary {
    /// Card ID.
    pub id: GiftCardId,
    /// Human-readable code.
    pub code: CardCode,
    /// Face value in cents.
    pub face_amount: Money,
    /// Remaining value in cents.
    pub remaining_amount: Money,
    /// Card expiry.
    pub expires_at: DateTime<Utc>,
    /// Recipient email the card is bound to, if any.
    pub recipient_email: Option<Email>,
    /// Whether the card was bought as a gift.
    pub is_gift: bool,
}

/// Purchase details handed over by the external purchase-completion step.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseDetails {
    /// Face value in cents. Must be positive.
    pub amount: Money,
    /// Purchaser display name.
    pub purchaser_name: Option<String>,
    /// Purchaser contact email.
    pub purchaser_email: Email,
    /// Purchaser contact phone.
    pub purchaser_phone: Option<String>,
    /// Recipient display name.
    pub recipient_name: Option<String>,
    /// Recipient email to bind the card to.
    pub recipient_email: Option<Email>,
    /// Gift message from the purchaser.
    pub gift_message: Option<String>,
    /// Whether this is a gift for someone else.
    #[serde(default)]
    pub is_gift: bool,
    /// Validity window in months. Defaults to the configured policy.
    pub validity_months: Option<u32>,
}

/// Insert shape for a new gift card.
#[derive(Debug, Clone)]
pub struct NewGiftCard {
    pub code: CardCode,
    pub token_hash: String,
    pub face_amount: Money,
    pub status: CardStatus,
    pub purchaser_name: Option<String>,
    pub purchaser_email: Email,
    pub purchaser_phone: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<Email>,
    pub gift_message: Option<String>,
    pub is_gift: bool,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
}

/// One staff-recorded in-store use of a card, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct CardUsage {
    /// Usage record ID.
    pub id: UsageId,
    /// Card the value was consumed from.
    pub gift_card_id: GiftCardId,
    /// Cents consumed by this visit.
    pub amount: Money,
    /// Remaining card value after this use.
    pub remaining_after: Money,
    /// Service rendered, e.g. "90-minute massage".
    pub service_name: Option<String>,
    /// Free-form staff notes.
    pub notes: Option<String>,
    /// When the use was recorded.
    pub created_at: DateTime<Utc>,
}
