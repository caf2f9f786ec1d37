//! Feature modules implementing the eDNA API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes. Commands and queries are plain structs with a `validate()` method
//! and a free `handle()` function, so they stay testable without any HTTP
//! machinery.

pub mod projects;

use axum::Router;

use crate::config::LimitsConfig;
use crate::storage::Storage;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// PostgreSQL connection pool
    pub db: sqlx::PgPool,
    /// Byte store for raw upload archival
    pub storage: Storage,
    /// Request limits
    pub limits: LimitsConfig,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/projects", projects::projects_routes().with_state(state))
}
