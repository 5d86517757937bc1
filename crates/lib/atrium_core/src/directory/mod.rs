//! Directory — read paths into the credential store and the permission
//! resolver.
//!
//! Roles and permissions are flat sets joined through explicit tables;
//! a subject's effective permissions are the union over its roles, with
//! no hierarchy to traverse. Resolution is recomputed on demand (login,
//! rotation, `/auth/me`) and never cached across requests, so a role or
//! permission edit is visible on the very next token issuance.

use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::auth::Principal;
use crate::models::directory::UserAccount;

/// Read-only contract against the credential store.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, AuthError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, AuthError>;

    /// Role names assigned to the user. Unknown user → empty.
    async fn roles_for_user(&self, id: Uuid) -> Result<Vec<String>, AuthError>;

    /// Permission codes attached to a role. Unknown role → empty.
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AuthError>;

    /// All user accounts, for directory listings.
    async fn list_users(&self) -> Result<Vec<UserAccount>, AuthError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), AuthError>;
}

/// Effective permission set: union over every assigned role.
pub async fn resolve_permissions(
    store: &dyn DirectoryStore,
    subject_id: Uuid,
) -> Result<BTreeSet<String>, AuthError> {
    let mut permissions = BTreeSet::new();
    for role in store.roles_for_user(subject_id).await? {
        permissions.extend(store.permissions_for_role(&role).await?);
    }
    Ok(permissions)
}

/// Resolve a live [`Principal`] for the subject from the directory.
pub async fn resolve_principal(
    store: &dyn DirectoryStore,
    subject_id: Uuid,
) -> Result<Principal, AuthError> {
    let role_names: BTreeSet<String> =
        store.roles_for_user(subject_id).await?.into_iter().collect();
    let permission_codes = resolve_permissions(store, subject_id).await?;
    Ok(Principal {
        subject_id,
        role_names,
        permission_codes,
    })
}
