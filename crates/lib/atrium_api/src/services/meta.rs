//! Request metadata extraction for the refresh token ledger.

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

use atrium_core::models::auth::RequestMeta;

/// Pull user agent and client IP out of the request headers.
///
/// The IP comes from `X-Forwarded-For` (first hop) since the service is
/// expected to sit behind a reverse proxy; absent headers are recorded
/// as NULL, not guessed.
pub fn from_headers(headers: &HeaderMap) -> RequestMeta {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());
    RequestMeta {
        user_agent,
        ip_address,
    }
}
