//! Write operations for projects

pub mod create;
pub mod ingest;

pub use create::{CreateProjectCommand, CreateProjectError, CreateProjectResponse};
pub use ingest::{IngestProjectCommand, IngestProjectError, IngestProjectResponse};
