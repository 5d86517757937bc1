//! Password and token-payload hashing via bcrypt.
//!
//! Refresh-token payloads go through the same primitive as passwords:
//! `bcrypt::verify` is the constant-time comparator, so stored hashes
//! are never compared by string equality.

use super::AuthError;

/// bcrypt cost factor for user passwords.
const PASSWORD_COST: u32 = 10;

/// bcrypt cost factor for refresh-token payloads. Lower than the
/// password cost: payloads are 32 random alphanumeric chars, not
/// guessable secrets, and rotation hashes on every refresh.
const TOKEN_COST: u32 = 6;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, PASSWORD_COST)?)
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Hash a refresh-token payload for ledger storage.
pub fn hash_token_payload(payload: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(payload, TOKEN_COST)?)
}

/// Constant-time check of a presented payload against a stored hash.
pub fn verify_token_payload(payload: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(payload, hash)?)
}
