//! Cookie service — the refresh token's only transport.
//!
//! The refresh cookie is HTTP-only, `SameSite=Strict`, and scoped to
//! `/auth` so it never rides along on resource requests. Max-Age always
//! equals the refresh token TTL; clearing uses Max-Age 0.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "atrium_refresh";

/// Build the HTTP-only cookie carrying a freshly issued refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(false) // TODO: set true once TLS termination is wired up
        .same_site(SameSite::Strict)
        .path("/auth".to_string())
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Build an expired cookie to clear the refresh token.
pub fn clear_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Strict)
        .path("/auth".to_string())
        .max_age(Duration::ZERO)
        .build()
}
