//! Notification collaborator.
//!
//! The engine emits events with everything a message needs; delivery
//! (email templates, providers, retries) belongs to the notification
//! service that consumes them. The redemption link inside `CardIssued`
//! carries the plaintext token - implementations must treat the event as
//! secret-bearing and must not log the link.

use std::sync::Mutex;

use wildflower_core::{CardCode, Disposition, Email, GiftCardId, IdentityId, Money};

/// An outbound event, carrying the data needed to compose a message.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A card was issued by purchase completion.
    CardIssued {
        /// The issued card.
        gift_card_id: GiftCardId,
        /// Human-readable code for the message body.
        code: CardCode,
        /// Face value.
        amount: Money,
        /// Purchaser contact.
        purchaser_email: Email,
        /// Recipient contact, when the card is a gift.
        recipient_email: Option<Email>,
        /// Recipient display name.
        recipient_name: Option<String>,
        /// Gift message from the purchaser.
        gift_message: Option<String>,
        /// One-time redemption link embedding the plaintext token.
        redemption_link: String,
    },
    /// A redemption completed.
    RedemptionSucceeded {
        /// The redeemed card.
        gift_card_id: GiftCardId,
        /// Human-readable code.
        code: CardCode,
        /// Identity the value was bound to.
        identity: IdentityId,
        /// Email the redeemer verified with.
        email: Email,
        /// Cents converted.
        amount: Money,
        /// The holder's disposition choice.
        disposition: Disposition,
        /// Committed wallet balance, for `wallet` dispositions.
        new_balance: Option<Money>,
    },
}

/// Sink for outbound notifications. Emit-only; implementations own
/// delivery and its failure handling.
pub trait Notifier: Send + Sync {
    /// Emit one event. Must not block on delivery.
    fn notify(&self, event: Notification);
}

/// Notifier that records event metadata to the log stream.
///
/// Logs kinds and ids only - never the redemption link, which embeds the
/// plaintext token.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Notification) {
        match event {
            Notification::CardIssued {
                gift_card_id,
                code,
                amount,
                recipient_email,
                ..
            } => {
                tracing::info!(
                    %gift_card_id,
                    %code,
                    %amount,
                    has_recipient = recipient_email.is_some(),
                    "card issued"
                );
            }
            Notification::RedemptionSucceeded {
                gift_card_id,
                code,
                identity,
                amount,
                disposition,
                ..
            } => {
                tracing::info!(
                    %gift_card_id,
                    %code,
                    %identity,
                    %amount,
                    %disposition,
                    "redemption succeeded"
                );
            }
        }
    }
}

/// Notifier that stores events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every event recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn drain(&self) -> Vec<Notification> {
        #[allow(clippy::unwrap_used)]
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Notification) {
        #[allow(clippy::unwrap_used)]
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_drains_in_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::RedemptionSucceeded {
            gift_card_id: GiftCardId::new(1),
            code: CardCode::parse("WF-AB3D-9KQX").unwrap(),
            identity: IdentityId::new("usr_1"),
            email: Email::parse("holder@example.com").unwrap(),
            amount: Money::from_cents(5000).unwrap(),
            disposition: Disposition::Wallet,
            new_balance: Some(Money::from_cents(5000).unwrap()),
        });

        let events = notifier.drain();
        assert_eq!(events.len(), 1);
        assert!(notifier.drain().is_empty());
    }
}
