//! Monetary amounts in integer minor currency units.
//!
//! All balances, face values, and transaction amounts in the gift-card
//! engine are integer cents. Arithmetic is checked: an overflow or a
//! subtraction below zero is an error, never a wrap or a silent clamp.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors from monetary arithmetic and validation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount must be strictly positive.
    #[error("amount must be positive (got {0} cents)")]
    NotPositive(i64),
    /// The amount must not be negative.
    #[error("amount cannot be negative (got {0} cents)")]
    Negative(i64),
    /// Checked arithmetic overflowed.
    #[error("monetary arithmetic overflow")]
    Overflow,
    /// Subtraction would produce a negative amount.
    #[error("insufficient amount: {available} cents available, {requested} cents requested")]
    Insufficient {
        /// Cents available before the operation.
        available: i64,
        /// Cents requested by the operation.
        requested: i64,
    },
}

/// A monetary amount in minor currency units (cents).
///
/// ```
/// use wildflower_core::Money;
///
/// let face = Money::from_cents(20_000).unwrap();
/// assert_eq!(face.cents(), 20_000);
/// assert_eq!(face.to_string(), "$200.00");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create an amount from cents, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] if `cents < 0`.
    pub const fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        if cents < 0 {
            return Err(MoneyError::Negative(cents));
        }
        Ok(Self(cents))
    }

    /// Create a strictly positive amount from cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::NotPositive`] if `cents <= 0`.
    pub const fn positive(cents: i64) -> Result<Self, MoneyError> {
        if cents <= 0 {
            return Err(MoneyError::NotPositive(cents));
        }
        Ok(Self(cents))
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether this amount is strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the sum exceeds `i64::MAX` cents.
    pub const fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        match self.0.checked_add(other.0) {
            Some(sum) => Ok(Self(sum)),
            None => Err(MoneyError::Overflow),
        }
    }

    /// Checked subtraction that refuses to go below zero.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Insufficient`] if `other > self`.
    pub const fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        if other.0 > self.0 {
            return Err(MoneyError::Insufficient {
                available: self.0,
                requested: other.0,
            });
        }
        Ok(Self(self.0 - other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl From<Money> for i64 {
    fn from(amount: Money) -> Self {
        amount.0
    }
}

// SQLx support (with postgres feature): stored as BIGINT cents.
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let cents = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(cents))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents_rejects_negative() {
        assert!(matches!(
            Money::from_cents(-1),
            Err(MoneyError::Negative(-1))
        ));
        assert!(Money::from_cents(0).is_ok());
    }

    #[test]
    fn test_positive_rejects_zero() {
        assert!(matches!(Money::positive(0), Err(MoneyError::NotPositive(0))));
        assert!(Money::positive(1).is_ok());
    }

    #[test]
    fn test_checked_add() {
        let a = Money::from_cents(1500).unwrap();
        let b = Money::from_cents(2500).unwrap();
        assert_eq!(a.checked_add(b).unwrap().cents(), 4000);
        assert!(matches!(
            Money(i64::MAX).checked_add(Money(1)),
            Err(MoneyError::Overflow)
        ));
    }

    #[test]
    fn test_checked_sub_refuses_negative_result() {
        let a = Money::from_cents(1000).unwrap();
        let b = Money::from_cents(1001).unwrap();
        assert!(matches!(
            a.checked_sub(b),
            Err(MoneyError::Insufficient {
                available: 1000,
                requested: 1001
            })
        ));
        assert_eq!(b.checked_sub(a).unwrap().cents(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(20_000).unwrap().to_string(), "$200.00");
        assert_eq!(Money::from_cents(5).unwrap().to_string(), "$0.05");
        assert_eq!(Money::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_serde_transparent() {
        let amount = Money::from_cents(4200).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "4200");
        let back: Money = serde_json::from_str("4200").unwrap();
        assert_eq!(back, amount);
    }
}
