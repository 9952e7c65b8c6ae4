//! Integration tests for the redemption protocol.
//!
//! The exactly-once property is exercised with real task-level
//! parallelism: 50 concurrent executions against one fresh card must
//! produce one success, 49 `AlreadyRedeemed` responses, and exactly one
//! ledger credit.

use std::sync::Arc;

use chrono::Duration;

use wildflower_core::{CardCode, CardStatus, Disposition, Email, IdentityId};
use wildflower_giftcards::db::Store;
use wildflower_giftcards::models::VerifyFlow;
use wildflower_giftcards::services::{RedemptionError, RedemptionService, WalletService};
use wildflower_integration_tests::TestEngine;

fn holder_email() -> Email {
    Email::parse("holder@example.com").expect("valid fixture email")
}

// =============================================================================
// Exactly-Once Redemption
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_fifty_concurrent_executions_credit_exactly_once() {
    let engine = TestEngine::new();
    let (card, token) = engine.issue_card(20_000, Duration::days(730), None).await;
    let email = holder_email();
    let identity = IdentityId::new("usr_1");
    engine.directory.insert(&email, identity.clone());

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&engine.store);
        let directory = Arc::clone(&engine.directory);
        let notifier = Arc::clone(&engine.notifier);
        let throttle = Arc::clone(&engine.throttle);
        let token = token.clone();
        let email = email.clone();
        let identity = identity.clone();
        handles.push(tokio::spawn(async move {
            let service = RedemptionService::new(
                store.as_ref(),
                directory.as_ref(),
                notifier.as_ref(),
                throttle.as_ref(),
            );
            service
                .execute_redemption(&token, &identity, &email, Disposition::Wallet)
                .await
        }));
    }

    let mut successes = 0;
    let mut already_redeemed = 0;
    for handle in handles {
        match handle.await.expect("task must not panic") {
            Ok(result) => {
                successes += 1;
                assert_eq!(result.amount.cents(), 20_000);
            }
            Err(RedemptionError::AlreadyRedeemed) => already_redeemed += 1,
            Err(other) => panic!("unexpected redemption error: {other}"),
        }
    }
    assert_eq!(successes, 1, "exactly one execution must win");
    assert_eq!(already_redeemed, 49);

    // The wallet was credited exactly once and reconciles.
    let wallet = engine
        .store
        .get_wallet(&identity)
        .await
        .expect("store read")
        .expect("wallet must exist");
    assert_eq!(wallet.balance.cents(), 20_000);
    let transactions = engine
        .store
        .list_wallet_transactions(wallet.id)
        .await
        .expect("store read");
    assert_eq!(transactions.len(), 1);
    WalletService::new(engine.store.as_ref())
        .verify_ledger(&identity)
        .await
        .expect("ledger must reconcile");

    // The card is consumed.
    let stored = engine
        .store
        .get_card(card.id)
        .await
        .expect("store read")
        .expect("card must exist");
    assert_eq!(stored.status, CardStatus::Redeemed);
    assert!(stored.remaining_amount.is_zero());
}

// =============================================================================
// Scenario A/B: validate, redeem to wallet, re-validate
// =============================================================================

#[tokio::test]
async fn test_validate_redeem_revalidate_round() {
    let engine = TestEngine::new();
    let (card, token) = engine.issue_card(20_000, Duration::days(730), None).await;
    let service = engine.redemption();

    // Scenario A: a fresh card validates with its full value.
    let summary = service.validate_token(&token).await.expect("must validate");
    assert_eq!(summary.id, card.id);
    assert_eq!(summary.remaining_amount.cents(), 20_000);

    // Scenario B: redeem to a wallet for identity U1.
    let email = holder_email();
    let identity = IdentityId::new("U1");
    engine.directory.insert(&email, identity.clone());

    let verification = service
        .verify_identity(&token, &email, Some(&identity))
        .await
        .expect("must verify");
    assert_eq!(verification.flow, VerifyFlow::Direct);

    let result = service
        .execute_redemption(&token, &identity, &email, Disposition::Wallet)
        .await
        .expect("must redeem");
    let outcome = result.wallet.expect("wallet disposition must credit");
    assert_eq!(outcome.new_balance.cents(), 20_000);

    let transactions = engine
        .store
        .list_wallet_transactions(outcome.wallet_id)
        .await
        .expect("store read");
    assert_eq!(transactions.len(), 1);
    let tx = transactions.first().expect("one transaction");
    assert_eq!(tx.amount.cents(), 20_000);
    assert_eq!(tx.balance_after.cents(), 20_000);

    // A subsequent validate on the same token reports already-redeemed.
    let err = service.validate_token(&token).await.expect_err("must reject");
    assert!(matches!(err, RedemptionError::AlreadyRedeemed));

    // And so does a retried execute: idempotent, no second credit.
    let err = service
        .execute_redemption(&token, &identity, &email, Disposition::Wallet)
        .await
        .expect_err("must reject");
    assert!(matches!(err, RedemptionError::AlreadyRedeemed));
    let wallet = WalletService::new(engine.store.as_ref())
        .wallet(&identity)
        .await
        .expect("wallet read");
    assert_eq!(wallet.balance.cents(), 20_000);
}

// =============================================================================
// Scenario D: expiry blocks the protocol before the ledger
// =============================================================================

#[tokio::test]
async fn test_expired_card_never_reaches_the_ledger() {
    let engine = TestEngine::new();
    let (card, token) = engine.issue_card(9_900, Duration::hours(-2), None).await;
    let email = holder_email();
    let identity = IdentityId::new("usr_1");
    engine.directory.insert(&email, identity.clone());
    let service = engine.redemption();

    let err = service.validate_token(&token).await.expect_err("must reject");
    assert!(matches!(err, RedemptionError::Expired));

    let err = service
        .execute_redemption(&token, &identity, &email, Disposition::Wallet)
        .await
        .expect_err("must reject");
    assert!(matches!(err, RedemptionError::Expired));

    // Nothing ledger-side happened, and the card can only be expired.
    assert!(engine.store.get_wallet(&identity).await.expect("read").is_none());
    assert!(engine.store.find_redemption(card.id).await.expect("read").is_none());
    let stored = engine
        .store
        .get_card(card.id)
        .await
        .expect("read")
        .expect("card exists");
    assert_eq!(stored.status, CardStatus::Expired);
}

// =============================================================================
// Identity flows and binding
// =============================================================================

#[tokio::test]
async fn test_identity_branching_and_recipient_binding() {
    let engine = TestEngine::new();
    let (_, token) = engine
        .issue_card(5_000, Duration::days(30), Some("gift.recipient@example.com"))
        .await;
    let service = engine.redemption();

    // Wrong email on a bound card is refused outright.
    let wrong = Email::parse("interloper@example.com").expect("valid");
    let err = service
        .verify_identity(&token, &wrong, None)
        .await
        .expect_err("must reject");
    assert!(matches!(err, RedemptionError::EmailMismatch));

    // The right email (any casing) walks the signup branch first...
    let bound = Email::parse("Gift.Recipient@Example.COM").expect("valid");
    let verification = service
        .verify_identity(&token, &bound, None)
        .await
        .expect("must verify");
    assert_eq!(verification.flow, VerifyFlow::RequireSignup);

    // ...then login once the account exists...
    let identity = IdentityId::new("usr_7");
    engine.directory.insert(&bound, identity.clone());
    let verification = service
        .verify_identity(&token, &bound, None)
        .await
        .expect("must verify");
    assert_eq!(verification.flow, VerifyFlow::RequireLogin);
    assert!(verification.identity.is_none());

    // ...and proceeds directly once authenticated as the owner.
    let verification = service
        .verify_identity(&token, &bound, Some(&identity))
        .await
        .expect("must verify");
    assert_eq!(verification.flow, VerifyFlow::Direct);
    assert_eq!(verification.identity, Some(identity.clone()));

    // Direct disposition consumes the card without a wallet.
    let result = service
        .execute_redemption(&token, &identity, &bound, Disposition::Direct)
        .await
        .expect("must redeem");
    assert!(result.wallet.is_none());
    assert!(engine.store.get_wallet(&identity).await.expect("read").is_none());
}

// =============================================================================
// Token secrecy
// =============================================================================

#[tokio::test]
async fn test_no_read_path_reveals_the_plaintext_token() {
    let engine = TestEngine::new();
    let (card, token) = engine.issue_card(20_000, Duration::days(730), None).await;

    // The stored card holds only a digest.
    let stored = engine
        .store
        .get_card(card.id)
        .await
        .expect("read")
        .expect("card exists");
    assert_ne!(stored.token_hash, token);
    assert_eq!(stored.token_hash.len(), 64);

    // The validate projection never carries the token in any field.
    let summary = engine.redemption().validate_token(&token).await.expect("validate");
    let json = serde_json::to_string(&summary).expect("serialize");
    assert!(!json.contains(&token));
    assert!(!json.contains(&stored.token_hash));
}

#[tokio::test]
async fn test_partner_prefixed_code_shape() {
    // Codes issued under another brand prefix still parse: two letters,
    // two confusable-free groups.
    let code = CardCode::parse("RJ-AB3D-9KQX").expect("valid partner code");
    assert_eq!(code.as_str(), "RJ-AB3D-9KQX");
}
