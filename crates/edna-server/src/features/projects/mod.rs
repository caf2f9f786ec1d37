//! Project management and survey ingestion
//!
//! Covers the project lifecycle: create and list projects, upload the five
//! survey files for ingestion, and read the aggregated reporting summary.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::projects_routes;
