use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ingest::{IngestError, IngestPipeline, IngestReport, ProjectFiles};
use crate::storage::Storage;

/// The five multipart field names an ingest upload must carry.
pub const REQUIRED_FILES: [&str; 5] = [
    "otu_table",
    "metadata",
    "sequences",
    "tax_table",
    "taxa_metadata",
];

#[derive(Debug, Clone)]
pub struct IngestProjectCommand {
    pub project_id: Uuid,
    pub files: ProjectFiles,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestProjectResponse {
    pub project_id: Uuid,
    pub report: IngestReport,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestProjectError {
    #[error("Missing required file: {0}")]
    MissingFile(&'static str),
    #[error("Failed to archive uploaded file: {0}")]
    Archive(#[source] anyhow::Error),
    #[error(transparent)]
    Pipeline(#[from] IngestError),
}

impl IngestProjectCommand {
    pub fn validate(&self) -> Result<(), IngestProjectError> {
        let present = [
            !self.files.otu_table.is_empty(),
            !self.files.metadata.is_empty(),
            !self.files.sequences.is_empty(),
            !self.files.tax_table.is_empty(),
            !self.files.taxa_metadata.is_empty(),
        ];
        for (name, ok) in REQUIRED_FILES.into_iter().zip(present) {
            if !ok {
                return Err(IngestProjectError::MissingFile(name));
            }
        }
        Ok(())
    }
}

/// Archive the raw uploads, then run the pipeline. Archival happens before
/// the parsing stages so the original bytes are preserved even when a later
/// stage fails, but only after the pipeline confirms the run would be
/// accepted: a rejected re-ingest must not overwrite the archive of the
/// still-live dataset.
#[tracing::instrument(skip(pool, storage, command), fields(project_id = %command.project_id, force = command.force))]
pub async fn handle(
    pool: PgPool,
    storage: Storage,
    command: IngestProjectCommand,
) -> Result<IngestProjectResponse, IngestProjectError> {
    command.validate()?;

    let pipeline = IngestPipeline::new(pool);
    pipeline
        .ensure_ready(command.project_id, command.force)
        .await?;

    let uploads: [(&str, &[u8]); 5] = [
        ("otu_table.tsv", &command.files.otu_table),
        ("metadata.tsv", &command.files.metadata),
        ("sequences.fasta", &command.files.sequences),
        ("tax_table.tsv", &command.files.tax_table),
        ("taxa_metadata.tsv", &command.files.taxa_metadata),
    ];
    for (filename, data) in uploads {
        let key = storage.build_project_key(command.project_id, filename);
        let result = storage
            .upload(&key, data.to_vec())
            .await
            .map_err(IngestProjectError::Archive)?;
        tracing::debug!(key = %result.key, size = result.size, checksum = %result.checksum, "archived upload");
    }

    let report = pipeline
        .ingest(command.project_id, &command.files, command.force)
        .await?;

    Ok(IngestProjectResponse {
        project_id: command.project_id,
        report,
    })
}
