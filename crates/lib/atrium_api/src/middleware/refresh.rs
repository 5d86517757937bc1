//! Auto-refresh interceptor.
//!
//! Makes a transient access-token expiry invisible to the current
//! request. A burst of concurrent requests carrying the same expired
//! access token must not each drive a rotation (the second one would
//! trip reuse detection and burn the whole session), so rotations are
//! coalesced per subject through a process-local single-flight map.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

use atrium_core::auth::AuthError;
use atrium_core::models::auth::SessionTokens;

use crate::AppState;
use crate::error::AppError;
use crate::services::{cookies, meta};

/// Response header carrying the transparently refreshed access token so
/// the client can adopt it for subsequent requests.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

type RotationFuture = Shared<BoxFuture<'static, Result<SessionTokens, AuthError>>>;

/// Single-flight map from subject key to the in-flight rotation.
///
/// Not a cache: an entry lives exactly as long as one rotation is in
/// flight, and is removed when it settles (success or failure) so the
/// next burst starts a fresh attempt.
#[derive(Clone, Default)]
pub struct InflightRotations {
    map: Arc<DashMap<String, RotationFuture>>,
}

impl InflightRotations {
    /// Join the in-flight rotation for `key`, or start one from `fut`.
    ///
    /// Returns the shared future plus a release guard held only by the
    /// caller that started the rotation; dropping the guard removes the
    /// entry, even if that caller's request is cancelled mid-await.
    fn join<F>(&self, key: String, fut: F) -> (RotationFuture, Option<ReleaseOnDrop>)
    where
        F: Future<Output = Result<SessionTokens, AuthError>> + Send + 'static,
    {
        match self.map.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(slot) => {
                let shared = fut.boxed().shared();
                slot.insert(shared.clone());
                let guard = ReleaseOnDrop {
                    map: self.map.clone(),
                    key,
                };
                (shared, Some(guard))
            }
        }
    }

    /// Number of rotations currently in flight.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

struct ReleaseOnDrop {
    map: Arc<DashMap<String, RotationFuture>>,
    key: String,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Axum middleware: on an *expired* access token, drive one rotation per
/// concurrent burst and retry the request with the fresh token.
///
/// Structurally invalid tokens pass through untouched — refusing them is
/// the identity check's job, not a reason to refresh.
pub async fn auto_refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(bearer) = crate::middleware::auth::bearer_token(request.headers()) else {
        return next.run(request).await;
    };

    match state.sessions.codec().verify_access(&bearer) {
        Ok(_) => next.run(request).await,
        Err(AuthError::TokenExpired) => {
            let Some(cookie) = jar.get(cookies::REFRESH_COOKIE) else {
                return refresh_failure(jar);
            };
            let refresh_token = cookie.value().to_string();

            // Key by subject when the token decodes at all; otherwise a
            // raw prefix still coalesces identical cookies.
            let key = state
                .sessions
                .codec()
                .peek_refresh_subject(&refresh_token)
                .map(|id| id.to_string())
                .unwrap_or_else(|| refresh_token.chars().take(16).collect());

            let rotation = {
                let sessions = state.sessions.clone();
                let request_meta = meta::from_headers(request.headers());
                let token = refresh_token.clone();
                async move { sessions.rotate(&token, request_meta).await }
            };
            let (shared, release) = state.inflight.join(key, rotation);
            let outcome = shared.await;
            drop(release);

            match outcome {
                Ok(tokens) => {
                    debug!("access token refreshed in-flight");
                    if let Ok(value) =
                        HeaderValue::from_str(&format!("Bearer {}", tokens.access_token))
                    {
                        request.headers_mut().insert(AUTHORIZATION, value);
                    }
                    let mut response = next.run(request).await;
                    if let Ok(value) = HeaderValue::from_str(&tokens.access_token) {
                        response.headers_mut().insert(ACCESS_TOKEN_HEADER, value);
                    }
                    let jar = jar.add(cookies::refresh_cookie(
                        &tokens.refresh_token,
                        state.sessions.codec().refresh_ttl_secs(),
                    ));
                    (jar, response).into_response()
                }
                Err(_) => refresh_failure(jar),
            }
        }
        // Bad signature or garbage: let the identity check reject it.
        Err(_) => next.run(request).await,
    }
}

/// Uniform refresh failure: clear the cookie, say nothing about why.
fn refresh_failure(jar: CookieJar) -> Response {
    (
        jar.add(cookies::clear_refresh_cookie()),
        AppError::Unauthorized("Authentication required".into()),
    )
        .into_response()
}
