use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{self, ProjectSummary, SummaryError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSummaryQuery {
    pub project_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetSummaryError {
    #[error("Project not found: {0}")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: GetSummaryQuery,
) -> Result<ProjectSummary, GetSummaryError> {
    aggregate::compute_project_summary(&pool, query.project_id)
        .await
        .map_err(|e| match e {
            SummaryError::ProjectNotFound(id) => GetSummaryError::NotFound(id),
            SummaryError::Database(e) => GetSummaryError::Database(e),
        })
}
