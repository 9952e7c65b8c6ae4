//! Domain models for the gift-card engine.
//!
//! These types represent validated domain objects separate from database
//! row types and from the JSON request/response shapes in `routes`.

pub mod card;
pub mod redemption;
pub mod wallet;

pub use card::{CardUsage, GiftCard, GiftCardSummary, NewGiftCard, PurchaseDetails};
pub use redemption::{
    IdentityVerification, NewRedemption, RedemptionRecord, RedemptionResult, VerifyFlow,
    WalletCreditOutcome,
};
pub use wallet::{LedgerEntry, TransactionReference, Wallet, WalletTransaction};
