//! Staff-facing card route handlers: issuance, detail, in-store use,
//! and cancellation.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wildflower_core::{CardCode, CardStatus, Email, GiftCardId, Money, WalletId};

use crate::error::{AppError, Result};
use crate::models::{CardUsage, GiftCard, PurchaseDetails};
use crate::services::CardService;
use crate::state::AppState;

/// Response of `POST /cards`: the issued card and its one-time
/// redemption link. The only response in the system that carries the
/// plaintext token (inside the link); it is never readable again.
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    /// New card id.
    pub id: GiftCardId,
    /// Human-readable code.
    pub code: CardCode,
    /// Face value in cents.
    pub face_amount: Money,
    /// Card expiry.
    pub expires_at: DateTime<Utc>,
    /// Redemption-link expiry (the token's own, shorter window).
    pub token_expires_at: DateTime<Utc>,
    /// One-time redemption link for the notification email.
    pub redemption_link: String,
}

/// Card detail for staff screens. Never includes token material.
#[derive(Debug, Serialize)]
pub struct CardDetailResponse {
    pub id: GiftCardId,
    pub code: CardCode,
    pub status: CardStatus,
    pub face_amount: Money,
    pub remaining_amount: Money,
    pub purchaser_name: Option<String>,
    pub purchaser_email: Email,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<Email>,
    pub is_gift: bool,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub wallet_id: Option<WalletId>,
    pub cancel_reason: Option<String>,
    pub usage: Vec<CardUsage>,
}

impl CardDetailResponse {
    fn from_card(card: GiftCard, usage: Vec<CardUsage>) -> Self {
        Self {
            id: card.id,
            code: card.code,
            status: card.status,
            face_amount: card.face_amount,
            remaining_amount: card.remaining_amount,
            purchaser_name: card.purchaser_name,
            purchaser_email: card.purchaser_email,
            recipient_name: card.recipient_name,
            recipient_email: card.recipient_email,
            is_gift: card.is_gift,
            purchased_at: card.purchased_at,
            expires_at: card.expires_at,
            redeemed_at: card.redeemed_at,
            wallet_id: card.wallet_id,
            cancel_reason: card.cancel_reason,
            usage,
        }
    }
}

/// Body of `POST /cards/{id}/use`.
#[derive(Debug, Deserialize)]
pub struct UseRequest {
    /// Cents to consume.
    pub amount: Money,
    /// Service rendered.
    pub service_name: Option<String>,
    /// Staff notes.
    pub notes: Option<String>,
}

/// Response of `POST /cards/{id}/use`.
#[derive(Debug, Serialize)]
pub struct UseResponse {
    /// The appended usage record.
    pub usage: CardUsage,
    /// Card status after the use.
    pub status: CardStatus,
    /// Remaining value after the use.
    pub remaining_amount: Money,
}

/// Body of `POST /cards/{id}/cancel`.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Why the card was voided.
    pub reason: Option<String>,
}

fn service(state: &AppState) -> CardService<'_> {
    CardService::new(state.store(), state.notifier(), state.config())
}

/// Issue a card from completed purchase details (called by the external
/// purchase-completion step once payment clears).
#[instrument(skip_all)]
pub async fn activate(
    State(state): State<AppState>,
    Json(details): Json<PurchaseDetails>,
) -> Result<(StatusCode, Json<IssueResponse>)> {
    let issued = service(&state).activate_gift_card(details).await?;
    let response = IssueResponse {
        id: issued.card.id,
        code: issued.card.code.clone(),
        face_amount: issued.card.face_amount,
        expires_at: issued.card.expires_at,
        token_expires_at: issued.card.token_expires_at,
        redemption_link: issued.redemption_link,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fetch a card with its usage history.
#[instrument(skip(state))]
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<GiftCardId>,
) -> Result<Json<CardDetailResponse>> {
    let service = service(&state);
    let card = service.get_card(id).await?;
    let usage = service.usage_history(id).await?;
    Ok(Json(CardDetailResponse::from_card(card, usage)))
}

/// Record in-store consumption of card value.
#[instrument(skip(state, request))]
pub async fn record_use(
    State(state): State<AppState>,
    Path(id): Path<GiftCardId>,
    Json(request): Json<UseRequest>,
) -> Result<Json<UseResponse>> {
    if !request.amount.is_positive() {
        return Err(AppError::BadRequest(
            "amount must be a positive number of cents".to_string(),
        ));
    }
    let (usage, card) = service(&state)
        .record_use(id, request.amount, request.service_name, request.notes)
        .await?;
    Ok(Json(UseResponse {
        usage,
        status: card.status,
        remaining_amount: card.remaining_amount,
    }))
}

/// Void a card.
#[instrument(skip(state, request))]
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<GiftCardId>,
    Json(request): Json<CancelRequest>,
) -> Result<StatusCode> {
    service(&state).cancel(id, request.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}
