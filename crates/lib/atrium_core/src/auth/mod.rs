//! Authentication and authorization logic.
//!
//! Token signing/verification, the refresh token ledger, and the
//! rotation protocol that ties them together. Shared by `atrium_api`
//! and any future worker surface.

pub mod jwt;
pub mod ledger;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod session;

use thiserror::Error;

/// Authentication errors.
///
/// Expected conditions (expiry, no match, bad credentials) are values,
/// never panics. `Clone` because rotation outcomes are shared across
/// coalesced concurrent refresh attempts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token is structurally wrong or signed with the wrong secret.
    #[error("Invalid token")]
    InvalidToken,

    /// Token is structurally valid but past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// A refresh token with a valid signature had no active ledger
    /// record: an already-rotated token is being replayed.
    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error("Missing permission '{0}'")]
    InsufficientPermissions(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Store(e.to_string())
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AuthError::Internal(format!("bcrypt: {e}"))
    }
}
