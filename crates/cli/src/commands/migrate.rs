//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! wf-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `GIFTCARDS_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to `DATABASE_URL`)

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

/// Errors from the migration command.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run gift-card database migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database URL is missing, the
/// connection fails, or a migration fails to apply.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url: SecretString = std::env::var("GIFTCARDS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrationError::MissingEnvVar("GIFTCARDS_DATABASE_URL"))?
        .into();

    tracing::info!("Connecting to gift-card database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running gift-card migrations...");
    sqlx::migrate!("../giftcards/migrations").run(&pool).await?;

    tracing::info!("Gift-card migrations complete!");
    Ok(())
}
