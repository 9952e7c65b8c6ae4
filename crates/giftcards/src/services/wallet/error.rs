//! Wallet service error types.

use thiserror::Error;

use wildflower_core::{Money, WalletId};

use crate::db::StoreError;

/// Errors from wallet ledger operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Amount must be a positive number of cents.
    #[error("amount must be positive")]
    InvalidAmount,

    /// The identity has no wallet yet.
    #[error("wallet not found")]
    NotFound,

    /// A debit asked for more than the balance holds.
    #[error("insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance {
        /// Current wallet balance.
        balance: Money,
        /// Amount requested.
        requested: Money,
    },

    /// The ledger failed reconciliation against the cached balance.
    #[error("ledger inconsistency for wallet {wallet_id}: {detail}")]
    Inconsistent {
        /// The wallet that failed the check.
        wallet_id: WalletId,
        /// What broke, in plain words.
        detail: String,
    },

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for WalletError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::InsufficientBalance { balance, requested } => {
                Self::InsufficientBalance { balance, requested }
            }
            other => Self::Store(other),
        }
    }
}
