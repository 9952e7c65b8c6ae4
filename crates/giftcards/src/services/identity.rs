//! Identity directory collaborator.
//!
//! The engine never authenticates anyone. It consumes an identity the
//! session layer already established, plus one question it must be able
//! to ask: "does this email belong to a known identity?". That question
//! drives the `direct` / `require_login` / `require_signup` branch of the
//! redemption protocol - a redemption must bind to a concrete
//! authenticated identity before any ledger mutation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use wildflower_core::{Email, IdentityId};

/// Failure talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdentityLookupError {
    /// The provider could not answer.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the external identity provider.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolve an email to a known identity, if one exists.
    ///
    /// The comparison is case-insensitive: the provider owns email
    /// normalization, and this engine treats equal-ignoring-case
    /// addresses as the same account.
    async fn lookup(&self, email: &Email) -> Result<Option<IdentityId>, IdentityLookupError>;
}

/// In-process directory over a fixed email-to-identity map.
///
/// Used by the test suites and by deployments that sync the session
/// service's account list into the engine process. Production wires the
/// session provider's own directory through the library API instead.
#[derive(Default)]
pub struct StaticDirectory {
    entries: RwLock<HashMap<String, IdentityId>>,
}

impl StaticDirectory {
    /// Create an empty directory: every lookup resolves to "unknown".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an email as belonging to `identity`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned, which only happens after
    /// a panic on another thread.
    pub fn insert(&self, email: &Email, identity: IdentityId) {
        #[allow(clippy::unwrap_used)]
        self.entries
            .write()
            .unwrap()
            .insert(email.as_str().to_ascii_lowercase(), identity);
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn lookup(&self, email: &Email) -> Result<Option<IdentityId>, IdentityLookupError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| IdentityLookupError::Unavailable(e.to_string()))?;
        Ok(entries.get(&email.as_str().to_ascii_lowercase()).cloned())
    }
}
