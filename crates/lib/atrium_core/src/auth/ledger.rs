//! Refresh token ledger — the persisted source of truth for rotation.
//!
//! Every issued refresh token has exactly one ledger row, storing a
//! bcrypt hash of the token's `jti` payload. `revoked_at` is terminal:
//! set at most once, never cleared.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AuthError, password};
use crate::models::auth::{NewRefreshToken, RefreshTokenRecord};

/// Storage contract for the refresh token ledger.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new ledger row.
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError>;

    /// Rows with `revoked_at IS NULL` and `expires_at > now`.
    async fn find_active_by_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError>;

    /// Atomically revoke the consumed row and persist its replacement.
    ///
    /// Fails with [`AuthError::ReuseDetected`] when the consumed row is
    /// already revoked: two rotation attempts raced over the same token
    /// and this one lost. Exactly one caller ever wins the revoke.
    async fn consume_and_replace(
        &self,
        consumed_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, AuthError>;

    /// Set `revoked_at = now`. Revoking an already-revoked row is a no-op.
    async fn revoke(&self, id: Uuid) -> Result<(), AuthError>;

    /// Revoke every active row for the subject. Returns the number of
    /// rows revoked.
    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<u64, AuthError>;
}

/// Match a presented `jti` payload against the subject's active records.
///
/// Iterates and compares through bcrypt's verify primitive — the stored
/// hash is salted, so there is no lookup key derivable from the
/// plaintext, and the comparison stays constant-time per record.
pub fn find_matching_record(
    records: &[RefreshTokenRecord],
    jti: &str,
    now: DateTime<Utc>,
) -> Result<Option<RefreshTokenRecord>, AuthError> {
    for record in records {
        if !record.is_active(now) {
            continue;
        }
        if password::verify_token_payload(jti, &record.token_hash)? {
            return Ok(Some(record.clone()));
        }
    }
    Ok(None)
}
