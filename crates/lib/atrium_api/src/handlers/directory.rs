//! Directory listing handlers. Gated behind the `user.read` permission
//! at the router.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use atrium_core::models::directory::UserSummary;

use crate::AppState;
use crate::error::AppResult;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}

/// `GET /users` — every account the directory knows about.
pub async fn list_users_handler(
    State(state): State<AppState>,
) -> AppResult<Json<UserListResponse>> {
    let users = state
        .sessions
        .directory()
        .list_users()
        .await?
        .iter()
        .map(UserSummary::from_account)
        .collect();
    Ok(Json(UserListResponse { users }))
}
