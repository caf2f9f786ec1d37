use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ProjectRow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectCommand {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateProjectError {
    #[error("Project name is required and cannot be empty")]
    NameRequired,
    #[error("Project name must be between 1 and 255 characters")]
    NameLength,
    #[error("A project with this name already exists")]
    DuplicateName,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CreateProjectCommand {
    pub fn validate(&self) -> Result<(), CreateProjectError> {
        if self.name.trim().is_empty() {
            return Err(CreateProjectError::NameRequired);
        }
        if self.name.len() > 255 {
            return Err(CreateProjectError::NameLength);
        }
        Ok(())
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    command: CreateProjectCommand,
) -> Result<CreateProjectResponse, CreateProjectError> {
    command.validate()?;

    let row: ProjectRow = sqlx::query_as(
        "INSERT INTO projects (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(command.name.trim())
    .fetch_one(&pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CreateProjectError::DuplicateName
        },
        _ => CreateProjectError::Database(e),
    })?;

    Ok(CreateProjectResponse {
        id: row.id,
        name: row.name,
        created_at: row.created_at,
    })
}
