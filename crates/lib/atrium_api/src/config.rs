//! API server configuration.

use atrium_core::auth::AuthError;
use atrium_core::auth::jwt::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, TokenCodec};

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3200").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub access_token_secret: String,
    /// Refresh token signing secret. Falls back to the access secret.
    pub refresh_token_secret: Option<String>,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: i64,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                | Default                                  |
    /// |-------------------------|------------------------------------------|
    /// | `BIND_ADDR`             | `127.0.0.1:3200`                         |
    /// | `DATABASE_URL`          | `postgres://localhost:5432/atrium`       |
    /// | `ACCESS_TOKEN_SECRET`   | required, no default                     |
    /// | `REFRESH_TOKEN_SECRET`  | unset → access secret is reused          |
    /// | `ACCESS_TOKEN_TTL_SECS` | `900` (15 minutes)                       |
    /// | `REFRESH_TOKEN_TTL_SECS`| `2592000` (30 days)                      |
    ///
    /// A missing or empty `ACCESS_TOKEN_SECRET` is a hard error: a
    /// baked-in fallback secret would let anyone who reads the source
    /// mint valid tokens.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let access_token_secret = var("ACCESS_TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Validation("ACCESS_TOKEN_SECRET must be set".into()))?;

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3200".into()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/atrium".into()),
            access_token_secret,
            refresh_token_secret: var("REFRESH_TOKEN_SECRET").filter(|s| !s.is_empty()),
            access_ttl_secs: var_i64(&var, "ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl_secs: var_i64(&var, "REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS),
        })
    }

    /// Build the token codec described by this configuration.
    pub fn codec(&self) -> Result<TokenCodec, AuthError> {
        TokenCodec::new(
            self.access_token_secret.clone(),
            self.refresh_token_secret.clone(),
            self.access_ttl_secs,
            self.refresh_ttl_secs,
        )
    }
}

fn var_i64(var: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> i64 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
