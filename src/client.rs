//! Client-side upload orchestration: an ordered selection of display
//! images (already-stored keys plus newly-picked local files) and the
//! batch submit that turns the local files into object keys.

use std::path::{Path, PathBuf};

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("too many images: at most {max} allowed")]
    TooManyFiles { max: usize },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("upload returned {returned} keys for {expected} files")]
    KeyCountMismatch { returned: usize, expected: usize },
}

/// One entry of the ordered gallery shown in the form.
#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub id: String,
    pub source: ImageSource,
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Already stored; rendered via the retrieval endpoint, never re-uploaded.
    Remote { key: String },
    /// Newly picked local file, uploaded on submit.
    Local { path: PathBuf },
}

/// Ordered, capped list of display images. Reordering and removal happen
/// here, before anything touches the network.
#[derive(Debug)]
pub struct ImageSelection {
    images: Vec<DisplayImage>,
    max_files: usize,
}

impl ImageSelection {
    pub fn new(max_files: usize) -> Self {
        Self {
            images: Vec::new(),
            max_files,
        }
    }

    /// Seeds the selection with keys already persisted on the work record.
    pub fn with_existing_keys<I, S>(keys: I, max_files: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let images = keys
            .into_iter()
            .map(|key| DisplayImage {
                id: Uuid::new_v4().to_string(),
                source: ImageSource::Remote { key: key.into() },
            })
            .collect();
        Self { images, max_files }
    }

    /// Appends newly picked files. Rejected wholesale when the result
    /// would exceed the cap; nothing is sent to the server either way.
    pub fn add_local_files<I, P>(&mut self, paths: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let new: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if self.images.len() + new.len() > self.max_files {
            return Err(ClientError::TooManyFiles {
                max: self.max_files,
            });
        }
        for path in new {
            self.images.push(DisplayImage {
                id: Uuid::new_v4().to_string(),
                source: ImageSource::Local { path },
            });
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) {
        self.images.retain(|img| img.id != id);
    }

    /// Drag-and-drop reorder: moves the image with `id` to `index`.
    pub fn move_to(&mut self, id: &str, index: usize) {
        if let Some(from) = self.images.iter().position(|img| img.id == id) {
            let img = self.images.remove(from);
            let to = index.min(self.images.len());
            self.images.insert(to, img);
        }
    }

    pub fn images(&self) -> &[DisplayImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Local files pending upload, in display order.
    pub fn pending_files(&self) -> Vec<&Path> {
        self.images
            .iter()
            .filter_map(|img| match &img.source {
                ImageSource::Local { path } => Some(path.as_path()),
                ImageSource::Remote { .. } => None,
            })
            .collect()
    }

    /// Final ordered key list: retained remote keys interleaved with the
    /// returned keys of the freshly uploaded files, in display order.
    /// The server preserves upload order, so zipping positionally is sound.
    pub fn merge_keys(&self, new_keys: &[String]) -> Result<Vec<String>, ClientError> {
        let expected = self.pending_files().len();
        if new_keys.len() != expected {
            return Err(ClientError::KeyCountMismatch {
                returned: new_keys.len(),
                expected,
            });
        }

        let mut fresh = new_keys.iter();
        Ok(self
            .images
            .iter()
            .filter_map(|img| match &img.source {
                ImageSource::Remote { key } => Some(key.clone()),
                ImageSource::Local { .. } => fresh.next().cloned(),
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct BatchKeys {
    keys: Vec<String>,
}

/// Thin client for the ingestion endpoint. No retry: a failed batch
/// surfaces as one error and the submission is aborted.
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Uploads the selection's pending files as one multipart batch and
    /// returns the full ordered key list (retained + fresh). Skips the
    /// network entirely when nothing new was picked.
    pub async fn submit(
        &self,
        uid: &str,
        selection: &ImageSelection,
    ) -> Result<Vec<String>, ClientError> {
        let pending = selection.pending_files();
        if pending.is_empty() {
            return selection.merge_keys(&[]);
        }

        let mut form = reqwest::multipart::Form::new().text("uid", uid.to_string());
        for path in &pending {
            let data = tokio::fs::read(path).await.map_err(|e| ClientError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());
            form = form.part(
                "images",
                reqwest::multipart::Part::bytes(data).file_name(file_name),
            );
        }

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected { status, body });
        }

        let batch: BatchKeys = response.json().await?;
        selection.merge_keys(&batch.keys)
    }

    /// URL the retrieval endpoint serves `key` under.
    pub fn image_url(&self, key: &str) -> String {
        format!(
            "{}/upload/get?date={}",
            self.base_url,
            utf8_percent_encode(key, NON_ALPHANUMERIC)
        )
    }
}
