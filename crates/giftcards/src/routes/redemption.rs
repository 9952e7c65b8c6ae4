//! Redemption protocol route handlers.
//!
//! Thin JSON shims over [`RedemptionService`]; every check runs
//! server-side on every call, so nothing here trusts an earlier
//! round-trip.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wildflower_core::{Disposition, Email, GiftCardId, IdentityId, Money, TransactionId};

use crate::error::{AppError, Result};
use crate::models::{GiftCardSummary, IdentityVerification, RedemptionResult};
use crate::services::RedemptionService;
use crate::state::AppState;

/// Body of `POST /redemption/validate`.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Plaintext token from the redemption link.
    pub token: String,
}

/// Body of `POST /redemption/verify-identity`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Plaintext token from the redemption link.
    pub token: String,
    /// Email the holder wants to redeem with.
    pub email: String,
    /// The caller's session identity, when they have one.
    pub identity: Option<IdentityId>,
}

/// Body of `POST /redemption/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Plaintext token from the redemption link.
    pub token: String,
    /// The caller's authenticated identity.
    pub identity: Option<IdentityId>,
    /// The verified email.
    pub email: String,
    /// The holder's disposition choice.
    pub disposition: Disposition,
}

/// Response of `POST /redemption/execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    /// The redeemed card.
    pub gift_card_id: GiftCardId,
    /// Cents converted.
    pub amount: Money,
    /// The disposition that was applied.
    pub disposition: Disposition,
    /// Committed wallet balance, for `wallet` dispositions.
    pub new_wallet_balance: Option<Money>,
    /// Ledger transaction id, for `wallet` dispositions.
    pub transaction_id: Option<TransactionId>,
}

impl From<RedemptionResult> for ExecuteResponse {
    fn from(result: RedemptionResult) -> Self {
        Self {
            gift_card_id: result.gift_card_id,
            amount: result.amount,
            disposition: result.disposition,
            new_wallet_balance: result.wallet.map(|w| w.new_balance),
            transaction_id: result.wallet.map(|w| w.transaction_id),
        }
    }
}

fn service(state: &AppState) -> RedemptionService<'_> {
    RedemptionService::new(
        state.store(),
        state.directory(),
        state.notifier(),
        state.throttle(),
    )
}

fn parse_email(raw: &str) -> Result<Email> {
    Email::parse(raw).map_err(|e| AppError::BadRequest(format!("invalid email: {e}")))
}

/// Validate a redemption link.
#[instrument(skip_all)]
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<GiftCardSummary>> {
    let summary = service(&state).validate_token(request.token.trim()).await?;
    Ok(Json(summary))
}

/// Verify the holder's email and pick the identity flow.
#[instrument(skip_all)]
pub async fn verify_identity(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<IdentityVerification>> {
    let email = parse_email(&request.email)?;
    let verification = service(&state)
        .verify_identity(request.token.trim(), &email, request.identity.as_ref())
        .await?;
    Ok(Json(verification))
}

/// Execute a redemption for an authenticated identity.
#[instrument(skip_all)]
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>> {
    let identity = request
        .identity
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Unauthorized("sign in to redeem this gift card".to_string()))?;
    let email = parse_email(&request.email)?;
    let result = service(&state)
        .execute_redemption(request.token.trim(), &identity, &email, request.disposition)
        .await?;
    Ok(Json(result.into()))
}
