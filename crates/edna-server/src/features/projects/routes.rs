//! ============================================================================
//! Project routes: CRUD, survey ingestion, and reporting summary
//! ============================================================================

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::ingest::{IngestError, ProjectFiles};

use super::commands::{
    self, CreateProjectCommand, CreateProjectError, IngestProjectCommand, IngestProjectError,
};
use super::queries::{
    self, GetProjectError, GetProjectQuery, GetSummaryError, GetSummaryQuery, ListProjectsError,
    ListProjectsQuery,
};
use crate::features::FeatureState;

pub fn projects_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id", get(get_project))
        .route("/:id/ingest", axum::routing::post(ingest_project))
        .route("/:id/summary", get(get_summary))
}

#[tracing::instrument(skip(state, command))]
async fn create_project(
    State(state): State<FeatureState>,
    Json(command): Json<CreateProjectCommand>,
) -> Result<Response, ProjectApiError> {
    let response = commands::create::handle(state.db, command).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn list_projects(
    State(state): State<FeatureState>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Response, ProjectApiError> {
    let response = queries::list::handle(state.db, query).await?;
    Ok(Json(ApiResponse::success(response)).into_response())
}

#[tracing::instrument(skip(state), fields(project_id = %id))]
async fn get_project(
    State(state): State<FeatureState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ProjectApiError> {
    let response = queries::get::handle(state.db, GetProjectQuery { project_id: id }).await?;
    Ok(Json(ApiResponse::success(response)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct IngestParams {
    force: Option<bool>,
}

#[tracing::instrument(skip(state, multipart), fields(project_id = %id))]
async fn ingest_project(
    State(state): State<FeatureState>,
    Path(id): Path<Uuid>,
    Query(params): Query<IngestParams>,
    mut multipart: Multipart,
) -> Result<Response, ProjectApiError> {
    let max_bytes = state.limits.max_upload_bytes;
    let mut files = ProjectFiles::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProjectApiError::Multipart(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        let slot = match field_name.as_str() {
            "otu_table" => &mut files.otu_table,
            "metadata" => &mut files.metadata,
            "sequences" => &mut files.sequences,
            "tax_table" => &mut files.tax_table,
            "taxa_metadata" => &mut files.taxa_metadata,
            // Unknown fields are ignored so clients can send extras.
            _ => continue,
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| ProjectApiError::Multipart(e.to_string()))?;
        if data.len() > max_bytes {
            return Err(ProjectApiError::FileTooLarge {
                field: field_name,
                limit: max_bytes,
            });
        }
        *slot = data.to_vec();
    }

    let command = IngestProjectCommand {
        project_id: id,
        files,
        force: params.force.unwrap_or(false),
    };
    let response = commands::ingest::handle(state.db, state.storage, command).await?;

    tracing::info!(
        samples = response.report.samples.created,
        otus = response.report.otus.created,
        "survey ingested via API"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state), fields(project_id = %id))]
async fn get_summary(
    State(state): State<FeatureState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ProjectApiError> {
    let response = queries::summary::handle(state.db, GetSummaryQuery { project_id: id }).await?;
    Ok(Json(ApiResponse::success(response)).into_response())
}

#[derive(Debug)]
enum ProjectApiError {
    Create(CreateProjectError),
    Ingest(IngestProjectError),
    Get(GetProjectError),
    List(ListProjectsError),
    Summary(GetSummaryError),
    Multipart(String),
    FileTooLarge { field: String, limit: usize },
}

impl From<CreateProjectError> for ProjectApiError {
    fn from(err: CreateProjectError) -> Self {
        Self::Create(err)
    }
}

impl From<IngestProjectError> for ProjectApiError {
    fn from(err: IngestProjectError) -> Self {
        Self::Ingest(err)
    }
}

impl From<GetProjectError> for ProjectApiError {
    fn from(err: GetProjectError) -> Self {
        Self::Get(err)
    }
}

impl From<ListProjectsError> for ProjectApiError {
    fn from(err: ListProjectsError) -> Self {
        Self::List(err)
    }
}

impl From<GetSummaryError> for ProjectApiError {
    fn from(err: GetSummaryError) -> Self {
        Self::Summary(err)
    }
}

impl IntoResponse for ProjectApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Create(e @ CreateProjectError::NameRequired)
            | Self::Create(e @ CreateProjectError::NameLength) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            },
            Self::Create(e @ CreateProjectError::DuplicateName) => {
                (StatusCode::CONFLICT, "DUPLICATE_NAME", e.to_string())
            },
            Self::Create(CreateProjectError::Database(e)) => internal(e),

            Self::Ingest(e @ IngestProjectError::MissingFile(_)) => {
                (StatusCode::BAD_REQUEST, "MISSING_FILE", e.to_string())
            },
            Self::Ingest(IngestProjectError::Archive(e)) => {
                tracing::error!(error = %e, "upload archival failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Failed to archive uploaded files".to_string(),
                )
            },
            Self::Ingest(IngestProjectError::Pipeline(e)) => match e {
                IngestError::ProjectNotFound(_) => {
                    (StatusCode::NOT_FOUND, "PROJECT_NOT_FOUND", e.to_string())
                },
                IngestError::AlreadyIngested => {
                    (StatusCode::CONFLICT, "ALREADY_INGESTED", e.to_string())
                },
                IngestError::Malformed(_) => {
                    (StatusCode::BAD_REQUEST, "MALFORMED_INPUT", e.to_string())
                },
                IngestError::CleanupFailed(err) | IngestError::Database(err) => internal(err),
            },

            Self::Get(e @ GetProjectError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "PROJECT_NOT_FOUND", e.to_string())
            },
            Self::Get(GetProjectError::Database(e)) => internal(e),

            Self::List(e @ ListProjectsError::InvalidLimit)
            | Self::List(e @ ListProjectsError::InvalidOffset) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            },
            Self::List(ListProjectsError::Database(e)) => internal(e),

            Self::Summary(e @ GetSummaryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "PROJECT_NOT_FOUND", e.to_string())
            },
            Self::Summary(GetSummaryError::Database(e)) => internal(e),

            Self::Multipart(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_MULTIPART",
                format!("Failed to read multipart upload: {msg}"),
            ),
            Self::FileTooLarge { field, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "FILE_TOO_LARGE",
                format!("File '{field}' exceeds the {limit} byte limit"),
            ),
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

fn internal(e: &sqlx::Error) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %e, "database error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "DATABASE_ERROR",
        "An internal error occurred".to_string(),
    )
}
