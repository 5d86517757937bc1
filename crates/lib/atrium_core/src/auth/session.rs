//! Session manager — token issuance, rotation, and revocation.
//!
//! Rotation state machine per refresh token:
//! `ISSUED → REVOKED` (consumed by rotation, logout, or reuse response)
//! or `ISSUED → EXPIRED` (implicit, by timestamp). Terminal either way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::TokenCodec;
use super::ledger::{RefreshTokenStore, find_matching_record};
use super::{AuthError, password};
use crate::directory::{self, DirectoryStore};
use crate::models::auth::{
    AuthUser, NewRefreshToken, Principal, RequestMeta, SessionTokens,
};
use crate::models::directory::{UserAccount, UserStatus};
use crate::uuid::uuidv7;

/// Drives the whole auth core: login, rotation, revocation, principal
/// resolution. Cheap to clone; shared behind the API state.
#[derive(Clone)]
pub struct SessionManager {
    directory: Arc<dyn DirectoryStore>,
    ledger: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        ledger: Arc<dyn RefreshTokenStore>,
        codec: TokenCodec,
    ) -> Self {
        Self {
            directory,
            ledger,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryStore> {
        &self.directory
    }

    /// Authenticate with email + password and issue a token pair.
    ///
    /// Wrong email, wrong password, and suspended accounts all yield the
    /// same `InvalidCredentials` so login never confirms account state.
    pub async fn login(
        &self,
        email: &str,
        password_plain: &str,
        meta: RequestMeta,
    ) -> Result<SessionTokens, AuthError> {
        let Some(user) = self.directory.find_user_by_email(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify_password(password_plain, hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if user.status != UserStatus::Active {
            info!(subject = %user.id, "login refused for non-active account");
            return Err(AuthError::InvalidCredentials);
        }

        let (tokens, record) = self.build_session(&user, &meta).await?;
        self.ledger.record(record).await?;
        info!(subject = %user.id, "session issued");
        Ok(tokens)
    }

    /// Issue a token pair for an already-verified subject.
    pub async fn issue(
        &self,
        subject_id: Uuid,
        meta: RequestMeta,
    ) -> Result<SessionTokens, AuthError> {
        let user = self
            .directory
            .find_user_by_id(subject_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {subject_id}")))?;
        let (tokens, record) = self.build_session(&user, &meta).await?;
        self.ledger.record(record).await?;
        Ok(tokens)
    }

    /// Rotate a refresh token: revoke-on-use, reuse detection, fresh pair.
    ///
    /// Roles and permissions are re-resolved live, never taken from the
    /// consumed token, so a grant change lands on the next refresh.
    pub async fn rotate(
        &self,
        refresh_token: &str,
        meta: RequestMeta,
    ) -> Result<SessionTokens, AuthError> {
        // A token that fails signature or type verification never
        // belonged to our issued set; that is not reuse evidence.
        let claims = self.codec.verify_refresh(refresh_token)?;
        let subject_id = claims.sub;

        let active = self.ledger.find_active_by_subject(subject_id).await?;
        let matched = find_matching_record(&active, &claims.jti, Utc::now())?;

        let Some(consumed) = matched else {
            // Valid signature, no active record: a rotated-away token is
            // being replayed. Burn every session the subject has.
            warn!(subject = %subject_id, "refresh token reuse detected, revoking all sessions");
            self.ledger.revoke_all_for_subject(subject_id).await?;
            return Err(AuthError::ReuseDetected);
        };

        let Some(user) = self.directory.find_user_by_id(subject_id).await? else {
            self.ledger.revoke_all_for_subject(subject_id).await?;
            return Err(AuthError::NotFound(format!("user {subject_id}")));
        };
        if user.status != UserStatus::Active {
            self.ledger.revoke_all_for_subject(subject_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let (tokens, replacement) = self.build_session(&user, &meta).await?;
        match self.ledger.consume_and_replace(consumed.id, replacement).await {
            Ok(_) => Ok(tokens),
            Err(AuthError::ReuseDetected) => {
                // Lost the revoke race to another process instance; treat
                // exactly like a replay.
                warn!(subject = %subject_id, "refresh token consumed concurrently, revoking all sessions");
                self.ledger.revoke_all_for_subject(subject_id).await?;
                Err(AuthError::ReuseDetected)
            }
            Err(e) => Err(e),
        }
    }

    /// Logout: revoke the record behind the presented token.
    ///
    /// Expiry is ignored (an expired token can still be logged out) and
    /// unparseable tokens are a silent no-op, so the endpoint never tells
    /// an attacker whether a token was valid.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        let Ok(claims) = self.codec.verify_refresh_ignoring_expiry(refresh_token) else {
            return Ok(());
        };
        let active = self.ledger.find_active_by_subject(claims.sub).await?;
        if let Some(record) = find_matching_record(&active, &claims.jti, Utc::now())? {
            self.ledger.revoke(record.id).await?;
            info!(subject = %claims.sub, "session revoked");
        }
        Ok(())
    }

    /// Logout-all: revoke every active session of the subject.
    pub async fn revoke_all(&self, subject_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.ledger.revoke_all_for_subject(subject_id).await?;
        info!(subject = %subject_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Decode a verified access token into a [`Principal`].
    pub fn principal_from_access_token(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.codec.verify_access(token)?;
        Ok(Principal::from_claims(&claims))
    }

    /// Re-resolve a live [`Principal`] from the directory.
    pub async fn resolve_principal(&self, subject_id: Uuid) -> Result<Principal, AuthError> {
        directory::resolve_principal(self.directory.as_ref(), subject_id).await
    }

    /// Sign a fresh token pair for the user and prepare its ledger row.
    async fn build_session(
        &self,
        user: &UserAccount,
        meta: &RequestMeta,
    ) -> Result<(SessionTokens, NewRefreshToken), AuthError> {
        let roles = self.directory.roles_for_user(user.id).await?;
        let permissions: Vec<String> =
            directory::resolve_permissions(self.directory.as_ref(), user.id)
                .await?
                .into_iter()
                .collect();

        let access_token = self.codec.sign_access(user.id, &roles, &permissions)?;
        let (refresh_token, refresh_claims) = self.codec.sign_refresh(user.id)?;

        let expires_at = DateTime::<Utc>::from_timestamp(refresh_claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("refresh expiry out of range".into()))?;
        let record = NewRefreshToken {
            id: uuidv7(),
            subject_id: user.id,
            token_hash: password::hash_token_payload(&refresh_claims.jti)?,
            expires_at,
            user_agent: meta.user_agent.clone(),
            ip_address: meta.ip_address.clone(),
        };

        let tokens = SessionTokens {
            access_token,
            refresh_token,
            expires_in: self.codec.access_ttl_secs(),
            user: AuthUser {
                id: user.id,
                email: user.email.clone(),
                display_name: user.display_name.clone(),
                roles,
                permissions,
            },
        };
        Ok((tokens, record))
    }
}
