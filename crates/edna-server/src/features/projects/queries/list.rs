use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::get::ProjectResponse;
use crate::models::ProjectRow;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProjectsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListProjectsError {
    #[error("Limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
    #[error("Offset must be non-negative")]
    InvalidOffset,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ListProjectsQuery {
    pub fn validate(&self) -> Result<(), ListProjectsError> {
        if let Some(limit) = self.limit {
            if limit < 1 || limit > MAX_LIMIT {
                return Err(ListProjectsError::InvalidLimit);
            }
        }
        if let Some(offset) = self.offset {
            if offset < 0 {
                return Err(ListProjectsError::InvalidOffset);
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: ListProjectsQuery,
) -> Result<Vec<ProjectResponse>, ListProjectsError> {
    query.validate()?;

    let rows: Vec<ProjectRow> = sqlx::query_as(
        "SELECT id, name, created_at FROM projects ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(query.limit.unwrap_or(DEFAULT_LIMIT))
    .bind(query.offset.unwrap_or(0))
    .fetch_all(&pool)
    .await?;

    Ok(rows.into_iter().map(ProjectResponse::from).collect())
}
