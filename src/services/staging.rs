use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::utils::validation::sanitized_extension;

/// A file written to local temporary storage during multipart parsing.
/// Must not outlive the request that created it: every handler path ends
/// in a deletion attempt (see [`UploadBatch::cleanup`]).
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub stored_name: String,
}

/// The staged files of one upload request plus the owner identifier the
/// keys are namespaced under.
#[derive(Debug, Default)]
pub struct UploadBatch {
    pub uid: String,
    pub files: Vec<StagedFile>,
}

impl UploadBatch {
    /// Object keys in input order, `{uid}/{storedName}`.
    pub fn keys(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| format!("{}/{}", self.uid, f.stored_name))
            .collect()
    }

    /// Best-effort removal of every staged file. Deletion failures are
    /// logged and never escalate past this point, so they cannot mask the
    /// error that brought us here.
    pub async fn cleanup(&self) {
        for file in &self.files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                tracing::warn!(
                    path = %file.path.display(),
                    "failed to remove staged file: {}",
                    e
                );
            }
        }
    }
}

/// Writes one multipart file part to the staging directory under a
/// request-scoped generated name, so concurrent batches never contend.
pub async fn stage_file(
    staging_dir: &Path,
    original_name: &str,
    data: &[u8],
) -> std::io::Result<StagedFile> {
    tokio::fs::create_dir_all(staging_dir).await?;

    let stored_name = format!("{}.{}", Uuid::new_v4(), sanitized_extension(original_name, data));
    let path = staging_dir.join(&stored_name);
    tokio::fs::write(&path, data).await?;

    Ok(StagedFile {
        path,
        original_name: original_name.to_string(),
        stored_name,
    })
}
