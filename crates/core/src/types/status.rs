//! Gift-card lifecycle status and related enums.
//!
//! `CardStatus` is the single authoritative record of where a card is in
//! its life. Timestamps like `redeemed_at` and linkage like `wallet_id`
//! are metadata of a state, never an alternate source of truth for it.

use serde::{Deserialize, Serialize};

/// Gift-card lifecycle status.
///
/// ```text
/// pending -> active -> {partially_used, used, redeemed, expired, cancelled}
/// partially_used -> {used, cancelled, expired}
/// ```
///
/// `used`, `redeemed`, `expired` and `cancelled` are terminal. No code
/// path transitions out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "card_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Payment not yet confirmed by the purchase-completion step.
    Pending,
    /// Paid and redeemable.
    Active,
    /// Some in-store value consumed, remainder spendable in store.
    PartiallyUsed,
    /// In-store use exhausted the remaining value.
    Used,
    /// Converted via the redemption protocol (wallet credit or direct use).
    Redeemed,
    /// Validity window elapsed before the value was consumed.
    Expired,
    /// Voided by staff.
    Cancelled,
}

impl CardStatus {
    /// Whether no further transition is permitted from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Redeemed | Self::Expired | Self::Cancelled)
    }

    /// Whether the redemption protocol may consume a card in this state.
    /// Only fully active cards are redeemable.
    #[must_use]
    pub const fn is_redeemable(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether staff may record in-store use against this state.
    #[must_use]
    pub const fn allows_use(self) -> bool {
        matches!(self, Self::Active | Self::PartiallyUsed)
    }

    /// Whether staff may void a card in this state.
    #[must_use]
    pub const fn allows_cancel(self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::PartiallyUsed)
    }

    /// Whether lazy expiry applies to this state once `expires_at` passes.
    #[must_use]
    pub const fn allows_expiry(self) -> bool {
        matches!(self, Self::Active | Self::PartiallyUsed)
    }

    /// The full transition matrix. Every status mutation in the engine is
    /// guarded by this predicate (and re-guarded by the storage layer).
    #[must_use]
    pub const fn allows_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Active | Self::Cancelled),
            Self::Active => matches!(
                next,
                Self::PartiallyUsed | Self::Used | Self::Redeemed | Self::Expired | Self::Cancelled
            ),
            Self::PartiallyUsed => {
                matches!(next, Self::PartiallyUsed | Self::Used | Self::Expired | Self::Cancelled)
            }
            Self::Used | Self::Redeemed | Self::Expired | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::PartiallyUsed => "partially_used",
            Self::Used => "used",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "partially_used" => Ok(Self::PartiallyUsed),
            "used" => Ok(Self::Used),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid card status: {s}")),
        }
    }
}

/// The holder's choice of how redeemed value is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "disposition", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Credit the face value to the holder's wallet ledger.
    Wallet,
    /// Mark the card consumed for a one-time direct use by the booking flow.
    Direct,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wallet => write!(f, "wallet"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Direction of a wallet ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "transaction_kind", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Balance increases by `amount`.
    Credit,
    /// Balance decreases by `amount`.
    Debit,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => write!(f, "credit"),
            Self::Debit => write!(f, "debit"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [CardStatus; 7] = [
        CardStatus::Pending,
        CardStatus::Active,
        CardStatus::PartiallyUsed,
        CardStatus::Used,
        CardStatus::Redeemed,
        CardStatus::Expired,
        CardStatus::Cancelled,
    ];

    #[test]
    fn test_terminal_states_admit_no_transition() {
        for from in ALL {
            if from.is_terminal() {
                for to in ALL {
                    assert!(
                        !from.allows_transition_to(to),
                        "{from} must not transition to {to}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_only_active_is_redeemable() {
        for status in ALL {
            assert_eq!(status.is_redeemable(), status == CardStatus::Active);
        }
    }

    #[test]
    fn test_use_and_cancel_guards() {
        assert!(CardStatus::Active.allows_use());
        assert!(CardStatus::PartiallyUsed.allows_use());
        assert!(!CardStatus::Pending.allows_use());
        assert!(!CardStatus::Redeemed.allows_use());

        assert!(CardStatus::Pending.allows_cancel());
        assert!(CardStatus::Active.allows_cancel());
        assert!(CardStatus::PartiallyUsed.allows_cancel());
        assert!(!CardStatus::Used.allows_cancel());
        assert!(!CardStatus::Expired.allows_cancel());
        assert!(!CardStatus::Cancelled.allows_cancel());
    }

    #[test]
    fn test_partial_use_transitions() {
        assert!(CardStatus::Active.allows_transition_to(CardStatus::PartiallyUsed));
        assert!(CardStatus::PartiallyUsed.allows_transition_to(CardStatus::PartiallyUsed));
        assert!(CardStatus::PartiallyUsed.allows_transition_to(CardStatus::Used));
        // A partially used card can no longer be redeemed online.
        assert!(!CardStatus::PartiallyUsed.allows_transition_to(CardStatus::Redeemed));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&CardStatus::PartiallyUsed).unwrap(),
            "\"partially_used\""
        );
        assert_eq!(serde_json::to_string(&Disposition::Wallet).unwrap(), "\"wallet\"");
        assert_eq!(
            serde_json::to_string(&TransactionKind::Credit).unwrap(),
            "\"credit\""
        );
    }

    #[test]
    fn test_display_from_str_roundtrip() {
        for status in ALL {
            let s = status.to_string();
            assert_eq!(s.parse::<CardStatus>().unwrap(), status);
        }
    }
}
