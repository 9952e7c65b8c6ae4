//! The redemption protocol.
//!
//! Stateless orchestration over the card store and the wallet ledger,
//! driven by an external caller in three steps:
//!
//! 1. [`RedemptionService::validate_token`] - resolve the link to a card
//!    summary, or a precise reason it no longer works;
//! 2. [`RedemptionService::verify_identity`] - bind the attempt to an
//!    email and decide the `direct` / `require_login` / `require_signup`
//!    branch. A redemption must bind to a concrete authenticated identity
//!    before any ledger mutation;
//! 3. [`RedemptionService::execute_redemption`] - re-validate everything
//!    server-side, then commit. The redemption-record insert is the
//!    serialization point: under concurrent or retried requests, exactly
//!    one commit wins and every other caller gets `AlreadyRedeemed`.
//!
//! Nothing from an earlier round-trip is trusted; each step re-runs the
//! full validation against stale client state.

mod error;
mod throttle;

pub use error::RedemptionError;
pub use throttle::VerifyThrottle;

use chrono::Utc;
use tracing::instrument;

use wildflower_core::{CardStatus, Disposition, Email, IdentityId};

use crate::db::Store;
use crate::models::{
    GiftCard, GiftCardSummary, IdentityVerification, NewRedemption, RedemptionResult,
    TransactionReference, VerifyFlow, WalletCreditOutcome,
};
use crate::services::identity::IdentityDirectory;
use crate::services::notify::{Notification, Notifier};
use crate::services::tokens;

/// Redemption protocol service.
pub struct RedemptionService<'a> {
    store: &'a dyn Store,
    directory: &'a dyn IdentityDirectory,
    notifier: &'a dyn Notifier,
    throttle: &'a VerifyThrottle,
}

impl<'a> RedemptionService<'a> {
    /// Create a new redemption service.
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        directory: &'a dyn IdentityDirectory,
        notifier: &'a dyn Notifier,
        throttle: &'a VerifyThrottle,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            throttle,
        }
    }

    /// Resolve a redemption link to a card summary.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` if no card matches; `AlreadyRedeemed` if a
    /// redemption record exists (checked explicitly, not inferred from
    /// status, to tolerate partial failures of a previous attempt);
    /// `Expired` if the card or the token is past its window;
    /// `NotActive` otherwise when the status is not `active`.
    #[instrument(skip_all)]
    pub async fn validate_token(
        &self,
        plaintext: &str,
    ) -> Result<GiftCardSummary, RedemptionError> {
        let card = self.validated_card(plaintext).await?;
        Ok(card.summary())
    }

    /// Bind a redemption attempt to an email and pick the identity flow.
    ///
    /// `authenticated` is the caller's session identity, if any; the
    /// engine consumes it as an opaque fact established elsewhere.
    ///
    /// # Errors
    ///
    /// Everything `validate_token` returns, plus `EmailMismatch` for a
    /// recipient-bound card accessed with the wrong address and
    /// `RateLimited` when the advisory attempt window is exhausted.
    #[instrument(skip_all)]
    pub async fn verify_identity(
        &self,
        plaintext: &str,
        supplied_email: &Email,
        authenticated: Option<&IdentityId>,
    ) -> Result<IdentityVerification, RedemptionError> {
        let token_hash = tokens::hash_token(plaintext);
        if !self.throttle.check(&token_hash, supplied_email) {
            return Err(RedemptionError::RateLimited);
        }

        // Defense against stale client state: re-run the token checks.
        let card = self.validated_card(plaintext).await?;
        check_recipient_binding(&card, supplied_email)?;

        let known = self.directory.lookup(supplied_email).await?;
        let verification = match known {
            Some(identity) if authenticated == Some(&identity) => IdentityVerification {
                flow: VerifyFlow::Direct,
                identity: Some(identity),
            },
            // The resolved id is not disclosed to a caller who has not
            // proven they own it.
            Some(_) => IdentityVerification {
                flow: VerifyFlow::RequireLogin,
                identity: None,
            },
            None => IdentityVerification {
                flow: VerifyFlow::RequireSignup,
                identity: None,
            },
        };
        Ok(verification)
    }

    /// Commit a redemption.
    ///
    /// Step order matters. The redemption-record insert and the card
    /// transition commit atomically first; the wallet credit follows as
    /// its own atomic unit. If the credit fails after the record
    /// committed, the protocol reports [`RedemptionError::PartialFailure`]
    /// for manual reconciliation - it neither re-credits blindly nor
    /// rolls back a redemption the holder was already told succeeded.
    ///
    /// Retrying after a success deterministically returns
    /// `AlreadyRedeemed`.
    ///
    /// # Errors
    ///
    /// Everything `validate_token` returns, plus `Unauthorized` /
    /// `IdentityMismatch` for identity problems and `PartialFailure` as
    /// above.
    #[instrument(skip(self, plaintext, email), fields(identity = %identity, %disposition))]
    pub async fn execute_redemption(
        &self,
        plaintext: &str,
        identity: &IdentityId,
        email: &Email,
        disposition: Disposition,
    ) -> Result<RedemptionResult, RedemptionError> {
        if identity.is_empty() {
            return Err(RedemptionError::Unauthorized);
        }

        // Never trusted from the earlier round-trips: re-validate.
        let card = self.validated_card(plaintext).await?;
        check_recipient_binding(&card, email)?;

        // The verified email must belong to the caller's identity.
        match self.directory.lookup(email).await? {
            Some(resolved) if &resolved == identity => {}
            Some(_) => return Err(RedemptionError::IdentityMismatch),
            None => return Err(RedemptionError::IdentityMismatch),
        }

        let amount = card.face_amount;
        let record = self
            .store
            .commit_redemption(NewRedemption {
                gift_card_id: card.id,
                redeemer_identity: identity.clone(),
                redeemer_email: email.clone(),
                amount,
                disposition,
            })
            .await?;

        let wallet = match disposition {
            Disposition::Wallet => {
                let description = format!("Gift card {} redeemed", card.code);
                let credit = self
                    .store
                    .credit_wallet(
                        identity,
                        email,
                        amount,
                        TransactionReference::GiftCard(card.id),
                        &description,
                    )
                    .await;
                match credit {
                    Ok(entry) => {
                        if let Err(e) = self.store.link_card_wallet(card.id, entry.wallet_id).await
                        {
                            tracing::warn!(
                                gift_card_id = %card.id,
                                wallet_id = %entry.wallet_id,
                                error = %e,
                                "wallet linkage write failed"
                            );
                        }
                        Some(WalletCreditOutcome {
                            wallet_id: entry.wallet_id,
                            new_balance: entry.balance,
                            transaction_id: entry.transaction_id,
                        })
                    }
                    Err(source) => {
                        tracing::error!(
                            gift_card_id = %card.id,
                            redemption_id = %record.id,
                            identity = %identity,
                            amount = %amount,
                            error = %source,
                            "wallet credit failed after redemption committed; manual reconciliation required"
                        );
                        return Err(RedemptionError::PartialFailure {
                            gift_card_id: card.id,
                            identity: identity.clone(),
                            amount,
                            source,
                        });
                    }
                }
            }
            Disposition::Direct => None,
        };

        self.notifier.notify(Notification::RedemptionSucceeded {
            gift_card_id: card.id,
            code: card.code.clone(),
            identity: identity.clone(),
            email: email.clone(),
            amount,
            disposition,
            new_balance: wallet.map(|w| w.new_balance),
        });

        Ok(RedemptionResult {
            gift_card_id: card.id,
            amount,
            disposition,
            wallet,
        })
    }

    /// The shared validation pipeline behind all three protocol steps.
    async fn validated_card(&self, plaintext: &str) -> Result<GiftCard, RedemptionError> {
        let token_hash = tokens::hash_token(plaintext);
        let card = self
            .store
            .find_card_by_token_hash(&token_hash)
            .await
            .map_err(RedemptionError::Store)?
            .ok_or(RedemptionError::TokenInvalid)?;

        // Explicit record check rather than trusting status alone, so a
        // partial failure from a previous attempt still reads as
        // already-redeemed.
        if self
            .store
            .find_redemption(card.id)
            .await
            .map_err(RedemptionError::Store)?
            .is_some()
        {
            return Err(RedemptionError::AlreadyRedeemed);
        }

        let now = Utc::now();
        if card.should_expire(now) {
            // Opportunistic write; the Expired answer stands even if the
            // write does not.
            if let Err(e) = self.store.mark_card_expired(card.id).await {
                tracing::warn!(gift_card_id = %card.id, error = %e, "lazy expiry write failed");
            }
            return Err(RedemptionError::Expired);
        }
        if card.status == CardStatus::Expired || card.token_expired(now) {
            return Err(RedemptionError::Expired);
        }
        if !card.status.is_redeemable() {
            return Err(RedemptionError::NotActive {
                current: card.status,
            });
        }
        Ok(card)
    }
}

/// Recipient-bound cards only redeem with a matching address
/// (case-insensitively; the token is the secret, not the email).
fn check_recipient_binding(card: &GiftCard, supplied: &Email) -> Result<(), RedemptionError> {
    if let Some(bound) = &card.recipient_email
        && !bound.matches(supplied)
    {
        return Err(RedemptionError::EmailMismatch);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wildflower_core::Money;

    use crate::db::{MemoryStore, StoreError};
    use crate::models::NewGiftCard;
    use crate::services::identity::StaticDirectory;
    use crate::services::notify::RecordingNotifier;

    struct Fixture {
        store: MemoryStore,
        directory: StaticDirectory,
        notifier: RecordingNotifier,
        throttle: VerifyThrottle,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                directory: StaticDirectory::new(),
                notifier: RecordingNotifier::new(),
                throttle: VerifyThrottle::new(100),
            }
        }

        fn service(&self) -> RedemptionService<'_> {
            RedemptionService::new(&self.store, &self.directory, &self.notifier, &self.throttle)
        }

        /// Issue a card directly through the store; returns the plaintext
        /// token alongside the card.
        async fn issue(
            &self,
            face: i64,
            recipient: Option<&str>,
            expires_in: Duration,
        ) -> (GiftCard, String) {
            let token = tokens::generate_token();
            let now = Utc::now();
            let card = self
                .store
                .create_card(NewGiftCard {
                    code: tokens::generate_code("WF"),
                    token_hash: token.hash,
                    face_amount: Money::from_cents(face).unwrap(),
                    status: CardStatus::Active,
                    purchaser_name: None,
                    purchaser_email: Email::parse("buyer@example.com").unwrap(),
                    purchaser_phone: None,
                    recipient_name: None,
                    recipient_email: recipient.map(|r| Email::parse(r).unwrap()),
                    gift_message: None,
                    is_gift: recipient.is_some(),
                    purchased_at: now,
                    expires_at: now + expires_in,
                    token_expires_at: now + Duration::hours(48),
                })
                .await
                .unwrap();
            (card, token.plaintext)
        }
    }

    fn holder_email() -> Email {
        Email::parse("holder@example.com").unwrap()
    }

    #[tokio::test]
    async fn test_validate_unknown_token() {
        let fx = Fixture::new();
        let err = fx.service().validate_token("no-such-token").await.unwrap_err();
        assert!(matches!(err, RedemptionError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_validate_returns_summary_without_token_material() {
        let fx = Fixture::new();
        let (card, token) = fx.issue(20_000, None, Duration::days(730)).await;

        let summary = fx.service().validate_token(&token).await.unwrap();
        assert_eq!(summary.id, card.id);
        assert_eq!(summary.remaining_amount.cents(), 20_000);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains(&token));
        assert!(!json.contains(&card.token_hash));
    }

    #[tokio::test]
    async fn test_validate_expired_card_marks_and_reports() {
        let fx = Fixture::new();
        let (card, token) = fx.issue(5_000, None, Duration::hours(-1)).await;

        let err = fx.service().validate_token(&token).await.unwrap_err();
        assert!(matches!(err, RedemptionError::Expired));

        // Opportunistically marked; a second read reports expired without
        // another write.
        let stored = fx.store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CardStatus::Expired);
        let err = fx.service().validate_token(&token).await.unwrap_err();
        assert!(matches!(err, RedemptionError::Expired));
    }

    #[tokio::test]
    async fn test_verify_identity_flows() {
        let fx = Fixture::new();
        let (_, token) = fx.issue(5_000, None, Duration::days(30)).await;
        let email = holder_email();
        let service = fx.service();

        // Unknown email: sign up first.
        let v = service.verify_identity(&token, &email, None).await.unwrap();
        assert_eq!(v.flow, VerifyFlow::RequireSignup);
        assert!(v.identity.is_none());

        // Known email, unauthenticated caller: log in first.
        fx.directory.insert(&email, IdentityId::new("usr_1"));
        let v = service.verify_identity(&token, &email, None).await.unwrap();
        assert_eq!(v.flow, VerifyFlow::RequireLogin);
        assert!(v.identity.is_none());

        // Authenticated as someone else: still log in.
        let other = IdentityId::new("usr_2");
        let v = service
            .verify_identity(&token, &email, Some(&other))
            .await
            .unwrap();
        assert_eq!(v.flow, VerifyFlow::RequireLogin);

        // Authenticated as the owner: proceed.
        let owner = IdentityId::new("usr_1");
        let v = service
            .verify_identity(&token, &email, Some(&owner))
            .await
            .unwrap();
        assert_eq!(v.flow, VerifyFlow::Direct);
        assert_eq!(v.identity, Some(owner));
    }

    #[tokio::test]
    async fn test_verify_identity_recipient_binding() {
        let fx = Fixture::new();
        let (_, token) = fx
            .issue(5_000, Some("Recipient@Example.com"), Duration::days(30))
            .await;
        let service = fx.service();

        let wrong = Email::parse("someone-else@example.com").unwrap();
        let err = service.verify_identity(&token, &wrong, None).await.unwrap_err();
        assert!(matches!(err, RedemptionError::EmailMismatch));

        // Case differences do not count as a mismatch.
        let right = Email::parse("recipient@example.COM").unwrap();
        let v = service.verify_identity(&token, &right, None).await.unwrap();
        assert_eq!(v.flow, VerifyFlow::RequireSignup);
    }

    #[tokio::test]
    async fn test_execute_wallet_disposition_credits_once() {
        let fx = Fixture::new();
        let (card, token) = fx.issue(20_000, None, Duration::days(30)).await;
        let email = holder_email();
        let identity = IdentityId::new("usr_1");
        fx.directory.insert(&email, identity.clone());
        let service = fx.service();

        let result = service
            .execute_redemption(&token, &identity, &email, Disposition::Wallet)
            .await
            .unwrap();
        assert_eq!(result.amount.cents(), 20_000);
        let outcome = result.wallet.unwrap();
        assert_eq!(outcome.new_balance.cents(), 20_000);

        // Card is consumed and linked.
        let stored = fx.store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CardStatus::Redeemed);
        assert!(stored.remaining_amount.is_zero());
        assert_eq!(stored.wallet_id, Some(outcome.wallet_id));
        assert_eq!(stored.redeemed_by, Some(identity.clone()));

        // A retry with the same token is idempotent.
        let err = service
            .execute_redemption(&token, &identity, &email, Disposition::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::AlreadyRedeemed));

        // And validate now reports the same.
        let err = service.validate_token(&token).await.unwrap_err();
        assert!(matches!(err, RedemptionError::AlreadyRedeemed));

        // Exactly one credit hit the ledger.
        let txs = fx
            .store
            .list_wallet_transactions(outcome.wallet_id)
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs.first().unwrap().amount.cents(), 20_000);
    }

    #[tokio::test]
    async fn test_execute_direct_disposition_touches_no_ledger() {
        let fx = Fixture::new();
        let (card, token) = fx.issue(7_500, None, Duration::days(30)).await;
        let email = holder_email();
        let identity = IdentityId::new("usr_9");
        fx.directory.insert(&email, identity.clone());

        let result = fx
            .service()
            .execute_redemption(&token, &identity, &email, Disposition::Direct)
            .await
            .unwrap();
        assert!(result.wallet.is_none());

        let stored = fx.store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CardStatus::Redeemed);
        assert!(fx.store.get_wallet(&identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_requires_matching_identity() {
        let fx = Fixture::new();
        let (_, token) = fx.issue(5_000, None, Duration::days(30)).await;
        let email = holder_email();
        fx.directory.insert(&email, IdentityId::new("usr_1"));
        let service = fx.service();

        // Empty identity: not authenticated.
        let err = service
            .execute_redemption(&token, &IdentityId::new(""), &email, Disposition::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::Unauthorized));

        // Authenticated as an identity that does not own the email.
        let err = service
            .execute_redemption(&token, &IdentityId::new("usr_2"), &email, Disposition::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::IdentityMismatch));
    }

    #[tokio::test]
    async fn test_execute_expired_never_reaches_ledger() {
        let fx = Fixture::new();
        let (card, token) = fx.issue(5_000, None, Duration::hours(-1)).await;
        let email = holder_email();
        let identity = IdentityId::new("usr_1");
        fx.directory.insert(&email, identity.clone());

        let err = fx
            .service()
            .execute_redemption(&token, &identity, &email, Disposition::Wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::Expired));

        assert!(fx.store.get_wallet(&identity).await.unwrap().is_none());
        assert!(fx.store.find_redemption(card.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_window_blocks_even_fresh_card() {
        let fx = Fixture::new();
        let token = tokens::generate_token();
        let now = Utc::now();
        fx.store
            .create_card(NewGiftCard {
                code: tokens::generate_code("WF"),
                token_hash: token.hash,
                face_amount: Money::from_cents(5_000).unwrap(),
                status: CardStatus::Active,
                purchaser_name: None,
                purchaser_email: Email::parse("buyer@example.com").unwrap(),
                purchaser_phone: None,
                recipient_name: None,
                recipient_email: None,
                gift_message: None,
                is_gift: false,
                purchased_at: now,
                expires_at: now + Duration::days(730),
                // The token window elapsed even though the card is fine.
                token_expires_at: now - Duration::hours(1),
            })
            .await
            .unwrap();

        let err = fx.service().validate_token(&token.plaintext).await.unwrap_err();
        assert!(matches!(err, RedemptionError::Expired));
    }

    #[tokio::test]
    async fn test_pending_card_is_not_active() {
        let fx = Fixture::new();
        let token = tokens::generate_token();
        let now = Utc::now();
        fx.store
            .create_card(NewGiftCard {
                code: tokens::generate_code("WF"),
                token_hash: token.hash,
                face_amount: Money::from_cents(5_000).unwrap(),
                status: CardStatus::Pending,
                purchaser_name: None,
                purchaser_email: Email::parse("buyer@example.com").unwrap(),
                purchaser_phone: None,
                recipient_name: None,
                recipient_email: None,
                gift_message: None,
                is_gift: false,
                purchased_at: now,
                expires_at: now + Duration::days(730),
                token_expires_at: now + Duration::hours(48),
            })
            .await
            .unwrap();

        let err = fx.service().validate_token(&token.plaintext).await.unwrap_err();
        assert!(matches!(
            err,
            RedemptionError::NotActive {
                current: CardStatus::Pending
            }
        ));
    }

    #[tokio::test]
    async fn test_verify_identity_rate_limited() {
        let fx = Fixture::new();
        let throttle = VerifyThrottle::new(2);
        let service =
            RedemptionService::new(&fx.store, &fx.directory, &fx.notifier, &throttle);
        let (_, token) = fx.issue(5_000, None, Duration::days(30)).await;
        let email = holder_email();

        let _ = service.verify_identity(&token, &email, None).await;
        let _ = service.verify_identity(&token, &email, None).await;
        let err = service.verify_identity(&token, &email, None).await.unwrap_err();
        assert!(matches!(err, RedemptionError::RateLimited));
    }

    #[tokio::test]
    async fn test_store_conflict_maps_to_already_redeemed() {
        // The From impl is part of the protocol contract: constraint
        // violations surface as AlreadyRedeemed, not as a generic 500.
        let err: RedemptionError = StoreError::Conflict("redemption record exists".into()).into();
        assert!(matches!(err, RedemptionError::AlreadyRedeemed));
    }
}
