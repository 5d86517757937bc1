//! Token codec — signing and verification of access and refresh JWTs.
//!
//! Access tokens are short-lived and stateless; their validity is purely
//! signature + expiry. Refresh tokens are signed with a distinct secret
//! (falling back to the access secret when none is configured) and carry
//! a random `jti` payload that the ledger stores in hashed form.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{AccessClaims, RefreshClaims};

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Marker claim distinguishing refresh tokens from access tokens.
const REFRESH_TYP: &str = "refresh";

/// Length of the random `jti` payload. Kept under bcrypt's 72-byte
/// input limit so the ledger hash covers the whole payload.
const JTI_LEN: usize = 32;

/// Signs and verifies Atrium's token pair (HS256).
#[derive(Clone)]
pub struct TokenCodec {
    access_secret: String,
    refresh_secret: Option<String>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenCodec {
    /// Build a codec. An empty access secret is a configuration bug.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: Option<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Result<Self, AuthError> {
        let access_secret = access_secret.into();
        if access_secret.is_empty() {
            return Err(AuthError::Internal(
                "access token secret must not be empty".into(),
            ));
        }
        Ok(Self {
            access_secret,
            refresh_secret: refresh_secret.filter(|s| !s.is_empty()),
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    fn refresh_secret(&self) -> &str {
        self.refresh_secret.as_deref().unwrap_or(&self.access_secret)
    }

    /// Exact-expiry validation: no clock leeway, so an expired token is
    /// reported as expired the moment `exp` passes.
    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }

    /// Sign an access token for the subject with its current roles and
    /// resolved permission codes. Each token carries a fresh `jti`, so
    /// no two issuances are ever byte-identical.
    pub fn sign_access(
        &self,
        subject: Uuid,
        roles: &[String],
        permissions: &[String],
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: subject,
            jti: random_payload(),
            roles: roles.to_vec(),
            perms: permissions.to_vec(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Sign a refresh token. Returns the token and its claims so the
    /// caller can hash the `jti` payload without re-decoding.
    pub fn sign_refresh(&self, subject: Uuid) -> Result<(String, RefreshClaims), AuthError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: subject,
            jti: random_payload(),
            typ: REFRESH_TYP.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.refresh_ttl_secs)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret().as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok((token, claims))
    }

    /// Verify an access token: signature first, then expiry, so callers
    /// can tell a bad token from a stale one.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Self::validation(),
        )
        .map(|data| data.claims)
        .map_err(map_jwt_error)
    }

    /// Verify a refresh token, including the `typ` marker.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret().as_bytes()),
            &Self::validation(),
        )
        .map(|data| data.claims)
        .map_err(map_jwt_error)?;
        if claims.typ != REFRESH_TYP {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Verify a refresh token's signature but ignore expiry. Logout must
    /// be able to revoke a token that has already expired.
    pub fn verify_refresh_ignoring_expiry(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let mut validation = Self::validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let claims = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(map_jwt_error)?;
        if claims.typ != REFRESH_TYP {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Best-effort subject extraction without signature verification.
    /// Used only to key the in-flight rotation map; never to authorize.
    pub fn peek_refresh_subject(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<RefreshClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims.sub)
    }
}

/// Random alphanumeric `jti` payload shared by both token classes.
fn random_payload() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LEN)
        .map(char::from)
        .collect()
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    }
}
