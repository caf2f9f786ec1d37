use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ProjectRow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProjectQuery {
    pub project_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetProjectError {
    #[error("Project not found: {0}")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ProjectRow> for ProjectResponse {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: GetProjectQuery,
) -> Result<ProjectResponse, GetProjectError> {
    let row: Option<ProjectRow> =
        sqlx::query_as("SELECT id, name, created_at FROM projects WHERE id = $1")
            .bind(query.project_id)
            .fetch_optional(&pool)
            .await?;

    row.map(ProjectResponse::from)
        .ok_or(GetProjectError::NotFound(query.project_id))
}
