//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-class errors
//! to Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`. The response body is a small JSON object with
//! a stable machine-readable `error` code and a human-readable message;
//! internal details never leave the process.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::{CardError, RedemptionError, WalletError};

/// Application-level error type for the gift-card service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Redemption protocol failure.
    #[error("redemption error: {0}")]
    Redemption(#[from] RedemptionError),

    /// Card operation failure.
    #[error("card error: {0}")]
    Card(#[from] CardError),

    /// Wallet ledger failure.
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Storage failure outside a service path.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body returned to clients.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable machine-readable code.
    error: &'static str,
    /// Human-readable explanation, safe for end users.
    message: String,
}

impl AppError {
    /// Whether this error is server-class and should reach Sentry.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::Internal(_)
                | Self::Redemption(
                    RedemptionError::Store(_)
                        | RedemptionError::PartialFailure { .. }
                        | RedemptionError::IdentityProvider(_)
                )
                | Self::Card(CardError::Store(_))
                | Self::Wallet(WalletError::Store(_) | WalletError::Inconsistent { .. })
        )
    }

    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Redemption(err) => redemption_response(err),
            Self::Card(err) => card_response(err),
            Self::Wallet(err) => wallet_response(err),
            Self::Store(_) => internal_body(),
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "not_found",
                    message: format!("{what} not found"),
                },
            ),
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "unauthorized",
                    message: message.clone(),
                },
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "bad_request",
                    message: message.clone(),
                },
            ),
            Self::Internal(_) => internal_body(),
        }
    }
}

fn internal_body() -> (StatusCode, ErrorBody) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody {
            error: "internal",
            message: "Internal server error".to_string(),
        },
    )
}

fn redemption_response(err: &RedemptionError) -> (StatusCode, ErrorBody) {
    match err {
        RedemptionError::TokenInvalid => (
            StatusCode::NOT_FOUND,
            ErrorBody {
                error: "token_invalid",
                message: "This redemption link is not valid.".to_string(),
            },
        ),
        RedemptionError::AlreadyRedeemed => (
            StatusCode::CONFLICT,
            ErrorBody {
                error: "already_redeemed",
                message: "This gift card has already been redeemed.".to_string(),
            },
        ),
        RedemptionError::Expired => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "expired",
                message: "This gift card or redemption link has expired.".to_string(),
            },
        ),
        RedemptionError::NotActive { current } => (
            StatusCode::CONFLICT,
            ErrorBody {
                error: "not_active",
                message: format!("This gift card is {current} and cannot be redeemed."),
            },
        ),
        RedemptionError::EmailMismatch => (
            StatusCode::FORBIDDEN,
            ErrorBody {
                error: "email_mismatch",
                message: "Use the email address this gift card was sent to.".to_string(),
            },
        ),
        RedemptionError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            ErrorBody {
                error: "unauthorized",
                message: "Sign in to redeem this gift card.".to_string(),
            },
        ),
        RedemptionError::IdentityMismatch => (
            StatusCode::FORBIDDEN,
            ErrorBody {
                error: "identity_mismatch",
                message: "This email belongs to a different account.".to_string(),
            },
        ),
        RedemptionError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            ErrorBody {
                error: "rate_limited",
                message: "Too many attempts. Try again in a minute.".to_string(),
            },
        ),
        RedemptionError::PartialFailure { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody {
                error: "partial_failure",
                message: "The redemption was recorded but the wallet credit did not complete. \
                          Our team has been notified and will reconcile your balance."
                    .to_string(),
            },
        ),
        RedemptionError::IdentityProvider(_) | RedemptionError::Store(_) => internal_body(),
    }
}

fn card_response(err: &CardError) -> (StatusCode, ErrorBody) {
    match err {
        CardError::InvalidAmount => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "invalid_amount",
                message: "Amount must be a positive number of cents.".to_string(),
            },
        ),
        CardError::InvalidValidity { months } => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "invalid_validity",
                message: format!("A validity window of {months} months is not allowed."),
            },
        ),
        CardError::NotFound => (
            StatusCode::NOT_FOUND,
            ErrorBody {
                error: "not_found",
                message: "Gift card not found.".to_string(),
            },
        ),
        CardError::WrongStatus { current } => (
            StatusCode::CONFLICT,
            ErrorBody {
                error: "wrong_status",
                message: format!("This gift card is {current} and cannot be changed."),
            },
        ),
        CardError::InsufficientValue {
            remaining,
            requested,
        } => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "insufficient_value",
                message: format!("Only {remaining} remains on this card; {requested} requested."),
            },
        ),
        CardError::CodeAllocation | CardError::Store(_) => internal_body(),
    }
}

fn wallet_response(err: &WalletError) -> (StatusCode, ErrorBody) {
    match err {
        WalletError::InvalidAmount => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "invalid_amount",
                message: "Amount must be a positive number of cents.".to_string(),
            },
        ),
        WalletError::NotFound => (
            StatusCode::NOT_FOUND,
            ErrorBody {
                error: "not_found",
                message: "No wallet exists for this identity.".to_string(),
            },
        ),
        WalletError::InsufficientBalance { balance, requested } => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "insufficient_balance",
                message: format!("Balance is {balance}; {requested} requested."),
            },
        ),
        WalletError::Inconsistent { .. } | WalletError::Store(_) => internal_body(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wildflower_core::{CardStatus, GiftCardId, IdentityId, Money};

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_redemption_status_codes() {
        assert_eq!(
            get_status(RedemptionError::TokenInvalid.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(RedemptionError::AlreadyRedeemed.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RedemptionError::Expired.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(
                RedemptionError::NotActive {
                    current: CardStatus::Pending
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RedemptionError::EmailMismatch.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(RedemptionError::Unauthorized.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(RedemptionError::RateLimited.into()),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_partial_failure_is_distinguishable() {
        let err: AppError = RedemptionError::PartialFailure {
            gift_card_id: GiftCardId::new(1),
            identity: IdentityId::new("usr_1"),
            amount: Money::from_cents(100).unwrap(),
            source: StoreError::NotFound,
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_card_status_codes() {
        assert_eq!(
            get_status(CardError::InvalidAmount.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(get_status(CardError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(
                CardError::WrongStatus {
                    current: CardStatus::Cancelled
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                CardError::InsufficientValue {
                    remaining: Money::from_cents(100).unwrap(),
                    requested: Money::from_cents(200).unwrap(),
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_wallet_status_codes() {
        assert_eq!(
            get_status(WalletError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(
                WalletError::InsufficientBalance {
                    balance: Money::ZERO,
                    requested: Money::from_cents(1).unwrap(),
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::Internal("connection pool exhausted on 10.0.0.3".to_string());
        let (_, body) = err.status_and_body();
        assert_eq!(body.message, "Internal server error");
        assert!(!body.message.contains("10.0.0.3"));
    }
}
