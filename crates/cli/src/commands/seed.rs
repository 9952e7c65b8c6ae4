//! Seed command: issue a demo gift card for local testing.
//!
//! Connects to the configured database, issues an active card through
//! the same service path production uses, and prints the code and the
//! one-time redemption link.

use std::sync::Arc;

use wildflower_core::{Email, Money};
use wildflower_giftcards::config::GiftcardsConfig;
use wildflower_giftcards::db::{self, PgStore};
use wildflower_giftcards::models::PurchaseDetails;
use wildflower_giftcards::services::{CardService, LogNotifier};

/// Errors from the seed command.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] wildflower_giftcards::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Card error: {0}")]
    Card(#[from] wildflower_giftcards::services::CardError),
}

/// Issue a demo card and print its code and redemption link.
///
/// # Errors
///
/// Returns `SeedError` if configuration, connection, or issuance fails.
pub async fn run(
    amount_cents: i64,
    purchaser_email: &str,
    recipient_email: Option<&str>,
) -> Result<(), SeedError> {
    let config = GiftcardsConfig::from_env()?;

    let amount = Money::positive(amount_cents)
        .map_err(|e| SeedError::InvalidInput(e.to_string()))?;
    let purchaser_email = Email::parse(purchaser_email)
        .map_err(|e| SeedError::InvalidInput(format!("purchaser email: {e}")))?;
    let recipient_email = recipient_email
        .map(Email::parse)
        .transpose()
        .map_err(|e| SeedError::InvalidInput(format!("recipient email: {e}")))?;

    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));
    let notifier = LogNotifier;
    let service = CardService::new(store.as_ref(), &notifier, &config);

    let issued = service
        .activate_gift_card(PurchaseDetails {
            amount,
            purchaser_name: Some("Seed Purchaser".to_string()),
            purchaser_email,
            purchaser_phone: None,
            recipient_name: None,
            is_gift: recipient_email.is_some(),
            recipient_email,
            gift_message: None,
            validity_months: None,
        })
        .await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Issued gift card {}", issued.card.code);
        println!("  face value: {}", issued.card.face_amount);
        println!("  expires:    {}", issued.card.expires_at);
        println!("  redeem at:  {}", issued.redemption_link);
    }

    Ok(())
}
