//! Code and token generation.
//!
//! Two different artifacts with two different jobs:
//!
//! - the **code** (`WF-AB3D-9KQX`) is a human-readable handle. It is not
//!   a secret and does not need to be unguessable, only collision-free at
//!   expected volume and unambiguous when read aloud;
//! - the **token** is the redemption capability. It is 128 bits of
//!   cryptographic randomness, handed to the caller exactly once for the
//!   redemption link, and persisted only as a SHA-256 digest - like a
//!   password-reset token, not a lookup key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

use wildflower_core::{CODE_ALPHABET, CardCode, GROUP_LEN};

/// Token length in bytes (128 bits).
const TOKEN_BYTES: usize = 16;

/// A freshly generated redemption token. The plaintext exists only in
/// this value; once it is embedded in the redemption link it is gone.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// URL-safe plaintext for the redemption link.
    pub plaintext: String,
    /// Hex SHA-256 digest for storage.
    pub hash: String,
}

/// Generate a card code with the given two-letter brand prefix.
///
/// Both groups are drawn uniformly from the restricted alphabet, giving
/// 30^8 (~6.5e11) combinations - collisions at expected volume are
/// negligible and are retried on the storage uniqueness constraint
/// regardless.
#[must_use]
pub fn generate_code(prefix: &str) -> CardCode {
    let mut rng = rand::rng();
    let mut group = || {
        (0..GROUP_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CODE_ALPHABET.len());
                char::from(CODE_ALPHABET[idx])
            })
            .collect::<String>()
    };
    let first = group();
    let second = group();
    CardCode::from_parts(prefix, &first, &second)
}

/// Generate a one-time redemption token.
///
/// Returns the plaintext (for the redemption link) and its hash (for
/// storage). The plaintext must never be persisted or logged.
#[must_use]
pub fn generate_token() -> IssuedToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&plaintext);
    IssuedToken { plaintext, hash }
}

/// Hash a plaintext token for storage or lookup.
#[must_use]
pub fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

/// Check a supplied plaintext against a stored hash.
#[must_use]
pub fn verify_token(plaintext: &str, hash: &str) -> bool {
    hash_token(plaintext) == hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wildflower_core::CardCodeError;

    #[test]
    fn test_generated_code_parses() {
        for _ in 0..100 {
            let code = generate_code("WF");
            // Round-trips through the validating parser.
            let parsed: Result<CardCode, CardCodeError> = CardCode::parse(code.as_str());
            assert_eq!(parsed.unwrap(), code);
        }
    }

    #[test]
    fn test_generated_codes_vary() {
        let a = generate_code("WF");
        let b = generate_code("WF");
        // 1-in-6.5e11 flake odds are acceptable.
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_hash_verifies() {
        let token = generate_token();
        assert!(verify_token(&token.plaintext, &token.hash));
        assert!(!verify_token("not-the-token", &token.hash));
    }

    #[test]
    fn test_token_is_url_safe_and_128_bit() {
        let token = generate_token();
        // 16 bytes -> 22 base64url chars, no padding.
        assert_eq!(token.plaintext.len(), 22);
        assert!(!token.plaintext.contains('='));
        assert!(!token.plaintext.contains('+'));
        assert!(!token.plaintext.contains('/'));
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let token = generate_token();
        // 32-byte digest, hex encoded.
        assert_eq!(token.hash.len(), 64);
        assert_ne!(token.hash, token.plaintext);
    }
}
