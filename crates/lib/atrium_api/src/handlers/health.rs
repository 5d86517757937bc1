use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::AppResult;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /healthz` — liveness plus a store reachability probe.
pub async fn healthz_handler(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    state.sessions.directory().ping().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: atrium_core::version(),
    }))
}
