//! Gift-card service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GIFTCARDS_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to `DATABASE_URL`)
//! - `GIFTCARDS_BASE_URL` - Public URL redemption links are built against
//!
//! ## Optional
//! - `GIFTCARDS_HOST` - Bind address (default: 127.0.0.1)
//! - `GIFTCARDS_PORT` - Listen port (default: 4000)
//! - `GIFTCARDS_CODE_PREFIX` - Two-letter brand prefix on card codes (default: WF)
//! - `GIFTCARDS_CARD_VALIDITY_MONTHS` - Card validity window (default: 24)
//! - `GIFTCARDS_TOKEN_TTL_HOURS` - Redemption-token validity window (default: 48)
//! - `GIFTCARDS_VERIFY_ATTEMPTS_PER_MINUTE` - Identity-verification throttle (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Gift-card service configuration.
#[derive(Debug, Clone)]
pub struct GiftcardsConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL redemption links are built against
    pub base_url: Url,
    /// Two-letter brand prefix on generated card codes
    pub code_prefix: String,
    /// How long a purchased card stays valid, in months
    pub card_validity_months: u32,
    /// How long the redemption token works, in hours. Independent of the
    /// card's own validity window.
    pub token_ttl_hours: u32,
    /// Identity-verification attempts allowed per (token, email) per minute
    pub verify_attempts_per_minute: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl GiftcardsConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("GIFTCARDS_DATABASE_URL")?;
        let host = get_env_or_default("GIFTCARDS_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("GIFTCARDS_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("GIFTCARDS_PORT", "4000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("GIFTCARDS_PORT".to_string(), e.to_string()))?;
        let base_url = Url::parse(&get_required_env("GIFTCARDS_BASE_URL")?).map_err(|e| {
            ConfigError::InvalidEnvVar("GIFTCARDS_BASE_URL".to_string(), e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "GIFTCARDS_BASE_URL".to_string(),
                "must be an http(s) URL".to_string(),
            ));
        }
        let code_prefix = validate_code_prefix(get_env_or_default("GIFTCARDS_CODE_PREFIX", "WF"))?;
        let card_validity_months = parse_env_or_default("GIFTCARDS_CARD_VALIDITY_MONTHS", 24)?;
        let token_ttl_hours = parse_env_or_default("GIFTCARDS_TOKEN_TTL_HOURS", 48)?;
        let verify_attempts_per_minute =
            parse_env_or_default("GIFTCARDS_VERIFY_ATTEMPTS_PER_MINUTE", 5)?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            code_prefix,
            card_validity_months,
            token_ttl_hours,
            verify_attempts_per_minute,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Build the redemption link for a plaintext token.
    ///
    /// The one place a plaintext token is rendered; the link goes into
    /// the issuance response and the `CardIssued` event, nowhere else.
    #[must_use]
    pub fn redemption_link(&self, plaintext_token: &str) -> String {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().unwrap_or_else(|()| {
                // Cannot-be-a-base URLs are rejected at load time.
                unreachable!("base_url validated at load")
            });
            segments.pop_if_empty().push("redeem").push(plaintext_token);
        }
        url.to_string()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a numeric environment variable with a default value.
fn parse_env_or_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// Validate the card-code brand prefix: exactly two ASCII letters.
fn validate_code_prefix(raw: String) -> Result<String, ConfigError> {
    let upper = raw.to_ascii_uppercase();
    if upper.len() != 2 || !upper.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ConfigError::InvalidEnvVar(
            "GIFTCARDS_CODE_PREFIX".to_string(),
            format!("must be two ASCII letters, got '{raw}'"),
        ));
    }
    Ok(upper)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> GiftcardsConfig {
        GiftcardsConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 4000,
            base_url: Url::parse("https://wildflowerdayspa.com").unwrap(),
            code_prefix: "WF".to_string(),
            card_validity_months: 24,
            token_ttl_hours: 48,
            verify_attempts_per_minute: 5,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_socket_addr() {
        let config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn test_redemption_link() {
        let config = test_config();
        assert_eq!(
            config.redemption_link("sGk2aF91xQ4mB7cD0eH3jg"),
            "https://wildflowerdayspa.com/redeem/sGk2aF91xQ4mB7cD0eH3jg"
        );
    }

    #[test]
    fn test_redemption_link_with_base_path() {
        let mut config = test_config();
        config.base_url = Url::parse("https://wildflowerdayspa.com/giftcards/").unwrap();
        assert_eq!(
            config.redemption_link("tok"),
            "https://wildflowerdayspa.com/giftcards/redeem/tok"
        );
    }

    #[test]
    fn test_validate_code_prefix() {
        assert_eq!(validate_code_prefix("wf".to_string()).unwrap(), "WF");
        assert!(validate_code_prefix("W".to_string()).is_err());
        assert!(validate_code_prefix("WFX".to_string()).is_err());
        assert!(validate_code_prefix("W1".to_string()).is_err());
    }
}
