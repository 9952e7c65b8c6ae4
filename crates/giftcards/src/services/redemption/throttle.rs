//! Advisory throttle on identity-verification attempts.
//!
//! Keyed per (token hash, email) so one holder fat-fingering an address
//! does not lock out everyone else. Advisory per the concurrency model:
//! the window is in-process and best-effort, and its failure mode is
//! only reduced enumeration protection, never a money-safety issue.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use wildflower_core::Email;

type VerifyKey = (String, String);

/// Keep the keyed store bounded; shrink once it crosses this many keys.
const MAX_TRACKED_KEYS: usize = 16_384;

/// Keyed limiter over (token hash, lowercased email).
pub struct VerifyThrottle {
    limiter: RateLimiter<VerifyKey, DefaultKeyedStateStore<VerifyKey>, DefaultClock>,
}

impl VerifyThrottle {
    /// Create a throttle allowing `per_minute` attempts per key.
    #[must_use]
    pub fn new(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Whether another attempt is allowed for this (token, email) pair.
    #[must_use]
    pub fn check(&self, token_hash: &str, email: &Email) -> bool {
        if self.limiter.len() > MAX_TRACKED_KEYS {
            self.limiter.retain_recent();
        }
        let key = (
            token_hash.to_owned(),
            email.as_str().to_ascii_lowercase(),
        );
        self.limiter.check_key(&key).is_ok()
    }
}
