//! Password policy, hashing and verification
//!
//! New hashes use Argon2id by default. Unsalted hex SHA-256 digests, the format
//! of older credential files, are still produced under the `sha256` scheme and
//! always verify.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PredictorError, Result};

/// Characters accepted as the "special character" of the policy
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    #[default]
    Argon2,
    Sha256,
}

/// Check a candidate password against the strength policy
///
/// Returns the first failed rule as `WeakPassword`.
pub fn validate_password_strength(password: &str) -> Result<()> {
    let weak = |msg: &str| -> Result<()> { Err(PredictorError::WeakPassword(msg.to_string())) };

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return weak("Password must be at least 8 characters long.");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return weak("Password must contain at least one uppercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return weak("Password must contain at least one lowercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return weak("Password must contain at least one number.");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return weak("Password must contain at least one special character.");
    }
    Ok(())
}

/// Hex SHA-256 of the raw password bytes
pub fn sha256_hex(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Hash a password with the given scheme
pub fn hash_password(password: &str, scheme: PasswordScheme) -> Result<String> {
    match scheme {
        PasswordScheme::Sha256 => Ok(sha256_hex(password)),
        PasswordScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PredictorError::Internal(format!("Failed to hash password: {e}")))
        }
    }
}

/// Verify a password against a stored hash of either format
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    if stored.starts_with("$argon2") {
        let parsed_hash = PasswordHash::new(stored)
            .map_err(|e| PredictorError::Internal(format!("Invalid password hash format: {e}")))?;
        return Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok());
    }

    if stored.len() == 64 && stored.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(sha256_hex(password).eq_ignore_ascii_case(stored));
    }

    Err(PredictorError::Internal("Unrecognised password hash format".into()))
}
