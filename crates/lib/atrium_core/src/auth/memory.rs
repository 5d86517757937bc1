//! In-memory store implementations.
//!
//! Back the test suites (and ad-hoc local runs) without a PostgreSQL
//! instance. Semantics mirror the Postgres implementations, including
//! the revoke-race behavior of `consume_and_replace`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::AuthError;
use super::ledger::RefreshTokenStore;
use crate::directory::DirectoryStore;
use crate::models::auth::{NewRefreshToken, RefreshTokenRecord};
use crate::models::directory::UserAccount;

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DirectoryData {
    users: Vec<UserAccount>,
    user_roles: HashMap<Uuid, Vec<String>>,
    role_permissions: HashMap<String, Vec<String>>,
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryData>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, account: UserAccount) {
        self.inner.lock().unwrap().users.push(account);
    }

    pub fn assign_role(&self, user_id: Uuid, role: &str) {
        self.inner
            .lock()
            .unwrap()
            .user_roles
            .entry(user_id)
            .or_default()
            .push(role.to_string());
    }

    /// Replace the permission codes attached to a role.
    pub fn set_role_permissions(&self, role: &str, permissions: &[&str]) {
        self.inner.lock().unwrap().role_permissions.insert(
            role.to_string(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, AuthError> {
        let data = self.inner.lock().unwrap();
        Ok(data.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, AuthError> {
        let data = self.inner.lock().unwrap();
        Ok(data.users.iter().find(|u| u.id == id).cloned())
    }

    async fn roles_for_user(&self, id: Uuid) -> Result<Vec<String>, AuthError> {
        let data = self.inner.lock().unwrap();
        Ok(data.user_roles.get(&id).cloned().unwrap_or_default())
    }

    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AuthError> {
        let data = self.inner.lock().unwrap();
        Ok(data.role_permissions.get(role).cloned().unwrap_or_default())
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, AuthError> {
        Ok(self.inner.lock().unwrap().users.clone())
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Refresh token ledger
// ---------------------------------------------------------------------------

/// In-memory refresh token ledger.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<RefreshTokenRecord>>,
    rotations: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful consume-and-replace operations. Lets tests
    /// assert the single-flight guarantee.
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::SeqCst)
    }

    /// Snapshot of every row, revoked ones included.
    pub fn all_rows(&self) -> Vec<RefreshTokenRecord> {
        self.rows.lock().unwrap().clone()
    }
}

fn materialize(token: NewRefreshToken) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: token.id,
        subject_id: token.subject_id,
        token_hash: token.token_hash,
        expires_at: token.expires_at,
        revoked_at: None,
        user_agent: token.user_agent,
        ip_address: token.ip_address,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryLedger {
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError> {
        let record = materialize(token);
        self.rows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_active_by_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let now = Utc::now();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.subject_id == subject_id && r.is_active(now))
            .cloned()
            .collect())
    }

    async fn consume_and_replace(
        &self,
        consumed_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, AuthError> {
        let mut rows = self.rows.lock().unwrap();
        let consumed = rows
            .iter_mut()
            .find(|r| r.id == consumed_id)
            .ok_or(AuthError::ReuseDetected)?;
        if consumed.revoked_at.is_some() {
            // Lost the race: someone else already consumed this token.
            return Err(AuthError::ReuseDetected);
        }
        consumed.revoked_at = Some(Utc::now());

        let record = materialize(replacement);
        rows.push(record.clone());
        self.rotations.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == id)
            && row.revoked_at.is_none()
        {
            row.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<u64, AuthError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let mut revoked = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.subject_id == subject_id && r.revoked_at.is_none())
        {
            row.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}
