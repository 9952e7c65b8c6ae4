//! Redemption protocol domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wildflower_core::{Disposition, Email, GiftCardId, IdentityId, Money, RedemptionId, TransactionId, WalletId};

/// One completed redemption. At most one exists per gift card; the
/// storage layer enforces that with a uniqueness constraint, and the
/// constraint - not an application-level read - is what makes redemption
/// exactly-once.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionRecord {
    /// Record ID.
    pub id: RedemptionId,
    /// The card that was redeemed.
    pub gift_card_id: GiftCardId,
    /// Authenticated identity the redemption is bound to.
    pub redeemer_identity: IdentityId,
    /// Email the redeemer verified with.
    pub redeemer_email: Email,
    /// Cents converted by this redemption.
    pub amount: Money,
    /// How the holder chose to apply the value.
    pub disposition: Disposition,
    /// When the redemption committed.
    pub redeemed_at: DateTime<Utc>,
}

/// Insert shape for a redemption record.
#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub gift_card_id: GiftCardId,
    pub redeemer_identity: IdentityId,
    pub redeemer_email: Email,
    pub amount: Money,
    pub disposition: Disposition,
}

/// The branch `verify_identity` puts the caller on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyFlow {
    /// Known identity, already authenticated as it: proceed immediately.
    Direct,
    /// Known identity, but the caller is unauthenticated or someone else.
    RequireLogin,
    /// No identity exists for this email yet.
    RequireSignup,
}

/// Result of `verify_identity`.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityVerification {
    /// Which flow the caller must follow before executing.
    pub flow: VerifyFlow,
    /// The resolved identity, present only for [`VerifyFlow::Direct`].
    pub identity: Option<IdentityId>,
}

/// Outcome of the wallet credit leg of a `wallet`-disposition redemption.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WalletCreditOutcome {
    /// Wallet that received the credit.
    pub wallet_id: WalletId,
    /// Committed balance after the credit.
    pub new_balance: Money,
    /// Ledger transaction appended by the credit.
    pub transaction_id: TransactionId,
}

/// Result of a successful `execute_redemption`.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionResult {
    /// The redeemed card.
    pub gift_card_id: GiftCardId,
    /// Cents converted.
    pub amount: Money,
    /// The holder's disposition choice.
    pub disposition: Disposition,
    /// Present iff the disposition was `wallet`.
    pub wallet: Option<WalletCreditOutcome>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_flow_serde_names() {
        assert_eq!(
            serde_json::to_string(&VerifyFlow::RequireLogin).unwrap(),
            "\"require_login\""
        );
        assert_eq!(serde_json::to_string(&VerifyFlow::Direct).unwrap(), "\"direct\"");
        assert_eq!(
            serde_json::to_string(&VerifyFlow::RequireSignup).unwrap(),
            "\"require_signup\""
        );
    }

    #[test]
    fn test_result_omits_wallet_for_direct() {
        let result = RedemptionResult {
            gift_card_id: GiftCardId::new(3),
            amount: Money::from_cents(5000).unwrap(),
            disposition: Disposition::Direct,
            wallet: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("wallet").map(serde_json::Value::is_null).unwrap_or(true));
    }
}
