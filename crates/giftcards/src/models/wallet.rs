//! Wallet and ledger domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wildflower_core::{Email, GiftCardId, IdentityId, Money, TransactionId, TransactionKind, UsageId, WalletId};

/// A per-identity wallet.
///
/// `balance` is a cached projection: it must always equal the
/// `balance_after` of the wallet's latest transaction, and the running sum
/// of all transactions. It is only ever mutated inside the ledger
/// primitive, in the same atomic unit as the transaction append.
#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    /// Wallet ID.
    pub id: WalletId,
    /// Owning identity (exactly one wallet per identity).
    pub owner_identity: IdentityId,
    /// Owner's email at wallet creation.
    pub owner_email: Email,
    /// Cached balance in cents.
    pub balance: Money,
    /// When the wallet was lazily created (first credit).
    pub created_at: DateTime<Utc>,
    /// Last balance mutation.
    pub updated_at: DateTime<Utc>,
}

/// What a ledger transaction points back at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TransactionReference {
    /// A redeemed gift card.
    GiftCard(GiftCardId),
    /// A service rendered against the wallet balance.
    ServiceUse(UsageId),
}

impl TransactionReference {
    /// Storage discriminant for the reference kind.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::GiftCard(_) => "gift_card",
            Self::ServiceUse(_) => "service_use",
        }
    }

    /// Storage value for the referenced row id.
    #[must_use]
    pub const fn ref_id(&self) -> i64 {
        match self {
            Self::GiftCard(id) => id.as_i64(),
            Self::ServiceUse(id) => id.as_i64(),
        }
    }

    /// Rebuild from the storage pair.
    #[must_use]
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "gift_card" => Some(Self::GiftCard(GiftCardId::new(id))),
            "service_use" => Some(Self::ServiceUse(UsageId::new(id))),
            _ => None,
        }
    }
}

/// One immutable wallet ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct WalletTransaction {
    /// Transaction ID (monotonic per wallet).
    pub id: TransactionId,
    /// Wallet this entry belongs to.
    pub wallet_id: WalletId,
    /// Credit or debit.
    pub kind: TransactionKind,
    /// Cents moved; always positive, signed by `kind`.
    pub amount: Money,
    /// Balance snapshot after applying this entry.
    pub balance_after: Money,
    /// Human-readable description for statements.
    pub description: String,
    /// Link back to the originating gift card or service use.
    pub reference: TransactionReference,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// The signed effect of this entry on the balance.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Credit => self.amount.cents(),
            TransactionKind::Debit => -self.amount.cents(),
        }
    }
}

/// Committed outcome of a ledger mutation, returned to the caller for
/// confirmation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LedgerEntry {
    /// Wallet that was mutated.
    pub wallet_id: WalletId,
    /// Balance after commit.
    pub balance: Money,
    /// The appended transaction.
    pub transaction_id: TransactionId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_storage_roundtrip() {
        let reference = TransactionReference::GiftCard(GiftCardId::new(17));
        assert_eq!(reference.kind_str(), "gift_card");
        assert_eq!(reference.ref_id(), 17);
        assert_eq!(
            TransactionReference::from_parts("gift_card", 17),
            Some(reference)
        );
        assert_eq!(TransactionReference::from_parts("unknown", 1), None);
    }

    #[test]
    fn test_signed_amount() {
        let mut tx = WalletTransaction {
            id: TransactionId::new(1),
            wallet_id: WalletId::new(1),
            kind: TransactionKind::Credit,
            amount: Money::from_cents(2500).unwrap(),
            balance_after: Money::from_cents(2500).unwrap(),
            description: "test".into(),
            reference: TransactionReference::GiftCard(GiftCardId::new(1)),
            created_at: Utc::now(),
        };
        assert_eq!(tx.signed_amount(), 2500);
        tx.kind = TransactionKind::Debit;
        assert_eq!(tx.signed_amount(), -2500);
    }

    #[test]
    fn test_reference_serde_shape() {
        let reference = TransactionReference::ServiceUse(UsageId::new(4));
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "{\"kind\":\"service_use\",\"id\":4}");
    }
}
