//! Raw upload archival
//!
//! The five survey files are archived byte-for-byte before ingestion so a
//! forced re-ingest can be audited against what was originally uploaded.
//! The backend (local filesystem or S3-compatible object store) is selected
//! once at startup from [`config::StorageConfig`]; the pipeline and engine
//! only ever see [`Storage`].

use anyhow::Result;
use tracing::instrument;
use uuid::Uuid;

use edna_common::checksum::sha256_hex;

pub mod config;
pub mod local;
pub mod s3;

pub use config::StorageConfig;
pub use local::LocalStorage;
pub use s3::S3Storage;

/// Outcome of an archival write.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

/// Configuration-selected byte store.
#[derive(Clone)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

impl Storage {
    pub fn from_config(config: &StorageConfig) -> Self {
        match config {
            StorageConfig::Local(local) => Self::Local(LocalStorage::new(local.root.clone())),
            StorageConfig::S3(s3) => Self::S3(S3Storage::new(s3)),
        }
    }

    #[instrument(skip(self, data))]
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        let checksum = sha256_hex(&data);
        let size = data.len() as i64;

        match self {
            Self::Local(local) => local.upload(key, &data).await?,
            Self::S3(s3) => s3.upload(key, data).await?,
        }

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    /// Retrieve an archived file, for auditing a dataset against the bytes
    /// originally uploaded.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        match self {
            Self::Local(local) => local.download(key).await,
            Self::S3(s3) => s3.download(key).await,
        }
    }

    pub fn build_project_key(&self, project_id: Uuid, filename: &str) -> String {
        format!("projects/{project_id}/{filename}")
    }
}
