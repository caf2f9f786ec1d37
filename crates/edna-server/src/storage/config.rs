use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which byte store backs raw upload archival. Selected once at startup via
/// `STORAGE_BACKEND` ("local" or "s3").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "backend")]
pub enum StorageConfig {
    Local(LocalConfig),
    S3(S3Config),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
        match backend.as_str() {
            "local" => Ok(Self::Local(LocalConfig {
                root: env::var("STORAGE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/uploads")),
            })),
            "s3" => Ok(Self::S3(S3Config {
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "edna-data".to_string()),
                access_key: env::var("S3_ACCESS_KEY")
                    .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                    .unwrap_or_else(|_| "minioadmin".to_string()),
                secret_key: env::var("S3_SECRET_KEY")
                    .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                    .unwrap_or_else(|_| "minioadmin".to_string()),
                path_style: env::var("S3_PATH_STYLE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
            })),
            other => anyhow::bail!("unknown STORAGE_BACKEND: {other}"),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::S3(S3Config {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        })
    }

    pub fn for_local(root: impl Into<PathBuf>) -> Self {
        Self::Local(LocalConfig { root: root.into() })
    }
}
