//! Redemption protocol error types.
//!
//! The taxonomy is part of the protocol contract: `Expired` is distinct
//! from `TokenInvalid` so callers can explain *why* a link stopped
//! working, and `AlreadyRedeemed` is always produced from the storage
//! uniqueness constraint, never from a read-then-check alone.

use thiserror::Error;

use wildflower_core::{CardStatus, GiftCardId, IdentityId, Money};

use crate::db::StoreError;
use crate::services::identity::IdentityLookupError;

/// Errors from the redemption protocol.
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// No card matches the supplied token.
    #[error("invalid redemption token")]
    TokenInvalid,

    /// A redemption record already exists for this card. The primary
    /// defense against double-spend; never retried automatically.
    #[error("gift card already redeemed")]
    AlreadyRedeemed,

    /// The card or its token is past the validity window.
    #[error("gift card or redemption link expired")]
    Expired,

    /// The card exists but is not in a redeemable state.
    #[error("gift card is {current}, not redeemable")]
    NotActive {
        /// The status the card is actually in.
        current: CardStatus,
    },

    /// A recipient-bound card was accessed with the wrong address.
    #[error("email does not match the card's recipient")]
    EmailMismatch,

    /// Execution requires an authenticated identity.
    #[error("redemption requires an authenticated identity")]
    Unauthorized,

    /// The supplied identity does not own the verified email.
    #[error("identity does not match the verified email")]
    IdentityMismatch,

    /// Too many verification attempts for this (token, email) pair.
    #[error("too many verification attempts, retry later")]
    RateLimited,

    /// The identity provider could not answer.
    #[error("identity lookup failed: {0}")]
    IdentityProvider(#[from] IdentityLookupError),

    /// The redemption record and card transition committed, but the
    /// wallet credit failed. The one outcome that demands manual
    /// reconciliation: re-crediting blindly could double-pay and rolling
    /// back would un-redeem a card the holder was told succeeded.
    #[error("redemption committed but wallet credit failed for card {gift_card_id}")]
    PartialFailure {
        /// The card whose redemption committed.
        gift_card_id: GiftCardId,
        /// The identity owed the credit.
        identity: IdentityId,
        /// The amount owed.
        amount: Money,
        /// What the credit failed with.
        #[source]
        source: StoreError,
    },

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RedemptionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::TokenInvalid,
            StoreError::Conflict(_) => Self::AlreadyRedeemed,
            StoreError::StatusGuard {
                current: CardStatus::Expired,
            } => Self::Expired,
            StoreError::StatusGuard { current } => Self::NotActive { current },
            other => Self::Store(other),
        }
    }
}
