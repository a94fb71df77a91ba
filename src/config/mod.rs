use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Limits and locations for the upload ingestion endpoint
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 10 MB)
    pub max_file_size: usize,

    /// Maximum number of file parts per batch (default: 7)
    pub max_files_per_batch: usize,

    /// Directory staged files are written to during multipart parsing
    pub staging_dir: PathBuf,

    /// Front-end origin allowed by CORS
    pub host_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MB
            max_files_per_batch: 7,
            staging_dir: env::temp_dir().join("work-image-staging"),
            host_url: "http://localhost:5173".to_string(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_files_per_batch: env::var("MAX_FILES_PER_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_files_per_batch),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            host_url: env::var("HOST_URL").unwrap_or(default.host_url),
        }
    }
}

/// Connection settings for the S3-compatible object store
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl StorageConfig {
    /// Load configuration from environment variables. Credentials and the
    /// bucket have no sane defaults, so missing values are hard errors.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?,
            bucket: env::var("BUCKET_NAME").context("BUCKET_NAME must be set")?,
            region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-northeast-1".to_string()),
            access_key: env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID must be set")?,
            secret_key: env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY must be set")?,
        })
    }
}
