//! Authentication domain models.
//!
//! These are internal domain models, distinct from API response shapes
//! (which live in `atrium_api` and carry camelCase renames).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthError;

/// Claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — user ID (standard JWT `sub` claim).
    pub sub: Uuid,
    /// Unique token id. Keeps two tokens minted for the same subject in
    /// the same second from being byte-identical.
    pub jti: String,
    /// Role names granted to the subject at issuance time.
    pub roles: Vec<String>,
    /// Permission codes resolved at issuance time.
    pub perms: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Claims embedded in refresh tokens.
///
/// The ledger never stores the token itself; it stores a bcrypt hash of
/// `jti`, the token's random payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Random payload, 32 alphanumeric chars. Hashed for storage.
    pub jti: String,
    /// Always `"refresh"`; access tokens never carry this claim.
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

/// Resolved identity + authorization of a verified caller.
///
/// Derived from a valid access token or re-resolved live from the
/// directory; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: Uuid,
    pub role_names: BTreeSet<String>,
    pub permission_codes: BTreeSet<String>,
}

impl Principal {
    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self {
            subject_id: claims.sub,
            role_names: claims.roles.iter().cloned().collect(),
            permission_codes: claims.perms.iter().cloned().collect(),
        }
    }

    /// AND semantics: every required code must be present. The error
    /// names the first missing code, for server-side logs only.
    pub fn require_all_permissions<'a, I>(&self, required: I) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for code in required {
            if !self.permission_codes.contains(code) {
                return Err(AuthError::InsufficientPermissions(code.to_string()));
            }
        }
        Ok(())
    }
}

/// One row of the refresh token ledger.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    /// bcrypt hash of the token's `jti` payload — never the plaintext.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// A ledger row about to be persisted.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Request metadata recorded alongside issued refresh tokens.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// User summary returned with a freshly issued token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub user: AuthUser,
}
