//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::GiftcardsConfig;
use crate::db::Store;
use crate::services::{IdentityDirectory, Notifier, VerifyThrottle};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// storage backend, the external collaborators, and configuration. It
/// holds no authoritative domain state: the engine runs as many
/// independent request handlers, and every correctness guarantee comes
/// from the storage layer.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GiftcardsConfig,
    store: Arc<dyn Store>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn Notifier>,
    throttle: VerifyThrottle,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: GiftcardsConfig,
        store: Arc<dyn Store>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let throttle = VerifyThrottle::new(config.verify_attempts_per_minute);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                directory,
                notifier,
                throttle,
            }),
        }
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &GiftcardsConfig {
        &self.inner.config
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the identity directory collaborator.
    #[must_use]
    pub fn directory(&self) -> &dyn IdentityDirectory {
        self.inner.directory.as_ref()
    }

    /// Get a reference to the notification sink.
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.inner.notifier.as_ref()
    }

    /// Get a reference to the verification-attempt throttle.
    #[must_use]
    pub fn throttle(&self) -> &VerifyThrottle {
        &self.inner.throttle
    }
}
