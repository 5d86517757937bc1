//! # atrium_api
//!
//! HTTP API library for Atrium.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use axum::Router;
use axum::extract::Request;
use axum::middleware::Next;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use atrium_core::auth::session::SessionManager;

use crate::config::ApiConfig;
use crate::handlers::{auth, directory, health};
use crate::middleware::refresh::InflightRotations;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Auth core: token issuance, rotation, principal resolution.
    pub sessions: SessionManager,
    /// API configuration.
    pub config: ApiConfig,
    /// Process-local single-flight map for concurrent refresh attempts.
    pub inflight: InflightRotations,
}

impl AppState {
    pub fn new(sessions: SessionManager, config: ApiConfig) -> Self {
        Self {
            sessions,
            config,
            inflight: InflightRotations::default(),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/healthz", get(health::healthz_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes: auto-refresh interception, then the identity
    // check; permission gates sit per-route on top.
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route(
            "/users",
            get(directory::list_users_handler).route_layer(axum::middleware::from_fn(
                |req: Request, next: Next| {
                    middleware::permissions::require(&["user.read"], req, next)
                },
            )),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::refresh::auto_refresh,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
