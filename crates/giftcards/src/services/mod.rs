//! Business services for the gift-card engine.
//!
//! Services are stateless orchestrations over the [`crate::db::Store`]
//! contract. Each holds only borrowed collaborators; all authoritative
//! state lives in storage.

pub mod cards;
pub mod identity;
pub mod notify;
pub mod redemption;
pub mod tokens;
pub mod wallet;

pub use cards::{CardError, CardService, IssuedCard};
pub use identity::{IdentityDirectory, IdentityLookupError, StaticDirectory};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use redemption::{RedemptionError, RedemptionService, VerifyThrottle};
pub use wallet::{WalletError, WalletService};
