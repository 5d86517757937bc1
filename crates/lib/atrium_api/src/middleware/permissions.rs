//! Permission gate — declarative per-route permission requirements.
//!
//! AND semantics: the caller must hold every listed code.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use atrium_core::models::auth::Principal;

use crate::error::AppError;

/// Gate a request on the given permission codes. Mounted as a
/// `route_layer` behind [`require_auth`](crate::middleware::auth::require_auth).
pub async fn require(
    required: &'static [&'static str],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    if let Err(e) = principal.require_all_permissions(required.iter().copied()) {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|code| !principal.permission_codes.contains(*code))
            .collect();
        debug!(
            subject = %principal.subject_id,
            ?missing,
            "permission denied"
        );
        // Maps to a 403 that names no codes; the log line above is the
        // only place the missing permissions appear.
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
