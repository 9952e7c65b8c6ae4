//! Wallet read route handlers.
//!
//! Read-only: the only writers to a wallet are the ledger primitives,
//! reached through redemption (credit) and the booking flow (debit).

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use wildflower_core::IdentityId;

use crate::error::Result;
use crate::models::{Wallet, WalletTransaction};
use crate::services::WalletService;
use crate::state::AppState;

/// Fetch an identity's wallet and cached balance.
#[instrument(skip(state))]
pub async fn balance(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<Wallet>> {
    let owner = IdentityId::new(identity);
    let wallet = WalletService::new(state.store()).wallet(&owner).await?;
    Ok(Json(wallet))
}

/// List an identity's ledger, oldest first.
#[instrument(skip(state))]
pub async fn transactions(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<Vec<WalletTransaction>>> {
    let owner = IdentityId::new(identity);
    let history = WalletService::new(state.store()).history(&owner).await?;
    Ok(Json(history))
}
