//! Authentication request handlers.
//!
//! The refresh token travels only in its HTTP-only cookie; response
//! bodies carry the access token and the user summary.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use atrium_core::auth::AuthError;
use atrium_core::models::auth::{AuthUser, Principal, SessionTokens};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::services::{cookies, meta};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: AuthUser,
}

impl TokenResponse {
    fn from_tokens(tokens: &SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            user: tokens.user.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    if body.email.is_empty() || body.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }

    let tokens = state
        .sessions
        .login(&body.email, &body.password, meta::from_headers(&headers))
        .await?;

    let jar = jar.add(cookies::refresh_cookie(
        &tokens.refresh_token,
        state.sessions.codec().refresh_ttl_secs(),
    ));
    Ok((jar, Json(TokenResponse::from_tokens(&tokens))))
}

/// `POST /auth/refresh` — rotate the cookie's refresh token into a new
/// pair. Every failure looks the same from outside: 401 and a cleared
/// cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let Some(cookie) = jar.get(cookies::REFRESH_COOKIE) else {
        return rejected(jar);
    };
    let refresh_token = cookie.value().to_string();

    match state
        .sessions
        .rotate(&refresh_token, meta::from_headers(&headers))
        .await
    {
        Ok(tokens) => {
            let jar = jar.add(cookies::refresh_cookie(
                &tokens.refresh_token,
                state.sessions.codec().refresh_ttl_secs(),
            ));
            (jar, Json(TokenResponse::from_tokens(&tokens))).into_response()
        }
        // Store/internal faults are server errors, not a reason to log
        // the client out.
        Err(e @ (AuthError::Store(_) | AuthError::Internal(_))) => {
            AppError::from(e).into_response()
        }
        Err(e) => {
            debug!(error = %e, "refresh rejected");
            rejected(jar)
        }
    }
}

/// `POST /auth/logout` — revoke the cookie's refresh token.
///
/// Idempotent and uninformative: a missing, malformed, or already-dead
/// token produces the same success response.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    if let Some(cookie) = jar.get(cookies::REFRESH_COOKIE) {
        state.sessions.revoke(cookie.value()).await?;
    }
    let jar = jar.add(cookies::clear_refresh_cookie());
    Ok((jar, Json(LogoutResponse { success: true })))
}

/// `POST /auth/logout-all` — revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    state.sessions.revoke_all(principal.subject_id).await?;
    let jar = jar.add(cookies::clear_refresh_cookie());
    Ok((jar, Json(LogoutResponse { success: true })))
}

/// `GET /auth/me` — the caller's identity with roles and permissions
/// re-resolved live, so a grant change shows up here before the next
/// token issuance.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .sessions
        .directory()
        .find_user_by_id(principal.subject_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;
    let live = state.sessions.resolve_principal(principal.subject_id).await?;

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        roles: live.role_names.into_iter().collect(),
        permissions: live.permission_codes.into_iter().collect(),
    }))
}

fn rejected(jar: CookieJar) -> Response {
    (
        jar.add(cookies::clear_refresh_cookie()),
        AppError::Unauthorized("Authentication required".into()),
    )
        .into_response()
}
