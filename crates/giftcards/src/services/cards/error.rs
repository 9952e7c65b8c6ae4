//! Card service error types.

use thiserror::Error;

use wildflower_core::{CardStatus, Money};

use crate::db::StoreError;

/// Errors from card issuance and staff-facing card operations.
#[derive(Debug, Error)]
pub enum CardError {
    /// Amount must be a positive number of cents.
    #[error("amount must be positive")]
    InvalidAmount,

    /// The requested validity window is outside policy.
    #[error("validity window of {months} months is outside policy")]
    InvalidValidity {
        /// Requested number of months.
        months: u32,
    },

    /// Code generation collided repeatedly; practically unreachable at
    /// our volume, surfaced rather than looped forever.
    #[error("could not allocate a unique card code")]
    CodeAllocation,

    /// No such card.
    #[error("card not found")]
    NotFound,

    /// The card's lifecycle state does not permit this operation.
    #[error("card status {current} does not permit this operation")]
    WrongStatus {
        /// The status the card is actually in.
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

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::StatusGuard { current } => Self::WrongStatus { current },
            StoreError::InsufficientValue {
                remaining,
                requested,
            } => Self::InsufficientValue {
                remaining,
                requested,
            },
            other => Self::Store(other),
        }
    }
}
