//! PostgreSQL-backed store implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use super::ledger::RefreshTokenStore;
use crate::directory::DirectoryStore;
use crate::models::auth::{NewRefreshToken, RefreshTokenRecord};
use crate::models::directory::{UserAccount, UserStatus};

/// Postgres implementation of both the directory and the ledger.
#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type UserRow = (Uuid, String, Option<String>, Option<String>, String);

fn user_from_row(row: UserRow) -> Result<UserAccount, AuthError> {
    let (id, email, display_name, password_hash, status) = row;
    let status = UserStatus::parse(&status)
        .ok_or_else(|| AuthError::Store(format!("unknown user status '{status}'")))?;
    Ok(UserAccount {
        id,
        email,
        display_name,
        password_hash,
        status,
    })
}

#[async_trait]
impl DirectoryStore for PgAuthStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, password_hash, status \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, password_hash, status \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).transpose()
    }

    async fn roles_for_user(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT p.code FROM roles r \
             JOIN role_permissions rp ON rp.role_id = r.id \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE r.name = $1",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, AuthError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, password_hash, status \
             FROM users ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn ping(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

type LedgerRow = (
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

fn ledger_from_row(row: LedgerRow) -> RefreshTokenRecord {
    let (id, subject_id, token_hash, expires_at, revoked_at, user_agent, ip_address, created_at) =
        row;
    RefreshTokenRecord {
        id,
        subject_id,
        token_hash,
        expires_at,
        revoked_at,
        user_agent,
        ip_address,
        created_at,
    }
}

#[async_trait]
impl RefreshTokenStore for PgAuthStore {
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError> {
        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO refresh_tokens \
             (id, subject_id, token_hash, expires_at, user_agent, ip_address) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING created_at",
        )
        .bind(token.id)
        .bind(token.subject_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(&token.user_agent)
        .bind(&token.ip_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(RefreshTokenRecord {
            id: token.id,
            subject_id: token.subject_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked_at: None,
            user_agent: token.user_agent,
            ip_address: token.ip_address,
            created_at,
        })
    }

    async fn find_active_by_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT id, subject_id, token_hash, expires_at, revoked_at, \
                    user_agent, ip_address, created_at \
             FROM refresh_tokens \
             WHERE subject_id = $1 \
               AND revoked_at IS NULL \
               AND expires_at > now() \
             ORDER BY created_at DESC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ledger_from_row).collect())
    }

    async fn consume_and_replace(
        &self,
        consumed_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, AuthError> {
        let mut tx = self.pool.begin().await?;

        // The `revoked_at IS NULL` guard makes this a compare-and-swap:
        // of two racing rotations over the same token, exactly one gets
        // a row back here and the other falls into the reuse path.
        let won = sqlx::query_scalar::<_, Uuid>(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE id = $1 AND revoked_at IS NULL \
             RETURNING id",
        )
        .bind(consumed_id)
        .fetch_optional(&mut *tx)
        .await?;

        if won.is_none() {
            return Err(AuthError::ReuseDetected);
        }

        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO refresh_tokens \
             (id, subject_id, token_hash, expires_at, user_agent, ip_address) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING created_at",
        )
        .bind(replacement.id)
        .bind(replacement.subject_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(&replacement.user_agent)
        .bind(&replacement.ip_address)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RefreshTokenRecord {
            id: replacement.id,
            subject_id: replacement.subject_id,
            token_hash: replacement.token_hash,
            expires_at: replacement.expires_at,
            revoked_at: None,
            user_agent: replacement.user_agent,
            ip_address: replacement.ip_address,
            created_at,
        })
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE subject_id = $1 AND revoked_at IS NULL",
        )
        .bind(subject_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
