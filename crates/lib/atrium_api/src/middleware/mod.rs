//! Request-pipeline stages.
//!
//! Order on protected routes: [`refresh::auto_refresh`] first (may swap
//! an expired bearer for a fresh one), then [`auth::require_auth`]
//! (identity), then per-route [`permissions::require`] gates.

pub mod auth;
pub mod permissions;
pub mod refresh;
