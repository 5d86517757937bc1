//! # atrium_core
//!
//! Core domain logic for Atrium.

pub mod auth;
pub mod directory;
pub mod migrate;
pub mod models;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
