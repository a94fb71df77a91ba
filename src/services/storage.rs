use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),
}

/// One retrieved blob: a single-pass byte stream plus the metadata the
/// store recorded for it. Re-reading requires a new `get`.
pub struct RetrievedObject {
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
}

/// Durable key-addressed blob storage. Implementations perform no
/// application-level retry; a failure surfaces immediately to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `local_path` under `key` and returns the
    /// resulting location descriptor.
    async fn put(&self, local_path: &Path, key: &str) -> Result<String, StoreError>;

    /// Point read by key.
    async fn get(&self, key: &str) -> Result<RetrievedObject, StoreError>;

    /// Removes the object under `key`. Used for compensating cleanup of
    /// batches that failed after some members were already written.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<String, StoreError> {
        let mut file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| StoreError::Write(format!("open {}: {}", local_path.display(), e)))?;

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| StoreError::Write("no upload ID".to_string()))?;

        let mut chunk_index = 1;
        let mut completed_parts = Vec::new();

        // 10MB parts keep memory bounded for arbitrarily large files.
        let chunk_size = 10 * 1024 * 1024;
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let mut n = 0;
            while n < chunk_size {
                let read = file
                    .read(&mut buffer[n..])
                    .await
                    .map_err(|e| StoreError::Write(e.to_string()))?;
                if read == 0 {
                    break;
                }
                n += read;
            }

            // S3 requires at least one part even for an empty object.
            if n == 0 && chunk_index > 1 {
                break;
            }

            let body = ByteStream::from(buffer[..n].to_vec());
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(body)
                .part_number(chunk_index)
                .send()
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(chunk_index)
                    .build(),
            );

            if n < chunk_size {
                break;
            }
            chunk_index += 1;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        Ok(format!("{}/{}", self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<RetrievedObject, StoreError> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match res {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
                return Err(StoreError::Read(service_error.to_string()));
            }
        };

        let content_type = output.content_type().map(|s| s.to_string());
        let content_length = output.content_length();
        let stream = ReaderStream::new(output.body.into_async_read()).boxed();

        Ok(RetrievedObject {
            stream,
            content_type,
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }
}

/// In-process store used by the test suite and local development. Content
/// type is sniffed from the bytes on write, mirroring what an S3 gateway
/// records; unrecognizable payloads carry no content type.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Option<String>, Bytes)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<String, StoreError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StoreError::Write(format!("open {}: {}", local_path.display(), e)))?;
        let content_type = infer::get(&data).map(|kind| kind.mime_type().to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content_type, Bytes::from(data)));
        Ok(format!("memory/{}", key))
    }

    async fn get(&self, key: &str) -> Result<RetrievedObject, StoreError> {
        let (content_type, data) = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;

        let content_length = Some(data.len() as i64);
        let stream = futures::stream::once(async move { Ok(data) }).boxed();

        Ok(RetrievedObject {
            stream,
            content_type,
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
