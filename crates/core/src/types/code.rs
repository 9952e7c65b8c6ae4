//! Human-readable gift-card codes.
//!
//! Codes are what staff read over the phone and holders type at the front
//! desk, so the alphabet excludes characters that are easily confused when
//! read aloud or handwritten (0/O, 1/I/L, U/V). The code is not a secret -
//! the redemption token is - but collisions must be negligible at expected
//! volume (~30^8 combinations).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Characters permitted in a card code, chosen to avoid visual and
/// spoken ambiguity.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of each code group between dashes.
pub const GROUP_LEN: usize = 4;

/// Errors that can occur when parsing a [`CardCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CardCodeError {
    /// The code does not match the `XX-XXXX-XXXX` shape.
    #[error("card code must match the form XX-XXXX-XXXX")]
    Malformed,
    /// A character outside the restricted alphabet was found.
    #[error("card code contains disallowed character '{0}'")]
    DisallowedChar(char),
}

/// A human-readable gift-card code: a two-letter prefix and two
/// four-character groups from the restricted alphabet, e.g. `WF-AB3D-9KQX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardCode(String);

impl CardCode {
    /// Parse a `CardCode`, normalizing to uppercase.
    ///
    /// # Errors
    ///
    /// Returns [`CardCodeError::Malformed`] if the shape is wrong, or
    /// [`CardCodeError::DisallowedChar`] if a group contains a character
    /// outside the restricted alphabet. The prefix may be any two ASCII
    /// letters (it identifies the issuing brand, not a random group).
    pub fn parse(s: &str) -> Result<Self, CardCodeError> {
        let upper = s.trim().to_ascii_uppercase();
        let mut parts = upper.split('-');

        let prefix = parts.next().ok_or(CardCodeError::Malformed)?;
        if prefix.len() != 2 || !prefix.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(CardCodeError::Malformed);
        }

        let mut groups = 0;
        for group in parts {
            if group.len() != GROUP_LEN {
                return Err(CardCodeError::Malformed);
            }
            for b in group.bytes() {
                if !CODE_ALPHABET.contains(&b) {
                    return Err(CardCodeError::DisallowedChar(char::from(b)));
                }
            }
            groups += 1;
        }
        if groups != 2 {
            return Err(CardCodeError::Malformed);
        }

        Ok(Self(upper))
    }

    /// Construct a code from pre-validated parts. Used by the generator,
    /// which only draws from [`CODE_ALPHABET`].
    #[must_use]
    pub fn from_parts(prefix: &str, first: &str, second: &str) -> Self {
        Self(format!("{prefix}-{first}-{second}"))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardCode {
    type Err = CardCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for CardCode {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CardCode {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for CardCode {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
