//! Multi-file ingestion
//!
//! Takes the five independently-formatted files describing one survey
//! project, reconciles their human-readable keys (sample names, OTU
//! identifiers, species names), and persists a consistent cross-referenced
//! dataset. The pipeline runs five sequential stages, each committing its
//! own transaction before the next begins, because later stages depend on
//! identifiers assigned by earlier ones.

pub mod pipeline;
pub mod reconciler;

pub use pipeline::{IngestPipeline, IngestReport, ProjectFiles, StageStats};

use thiserror::Error;
use uuid::Uuid;

use crate::parser::ParseError;

/// Fatal ingestion failures. Per-row unresolved references are not errors;
/// they are skipped with a warning and counted in the stage stats.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("project already has data; re-run with force=true to overwrite")]
    AlreadyIngested,

    #[error("malformed input: {0}")]
    Malformed(#[from] ParseError),

    #[error("failed to clear existing project data: {0}")]
    CleanupFailed(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
