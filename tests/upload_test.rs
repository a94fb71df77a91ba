use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::TryStreamExt;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use work_image_service::config::UploadConfig;
use work_image_service::services::storage::{
    MemoryObjectStore, ObjectStore, RetrievedObject, StoreError,
};
use work_image_service::{AppState, create_app};

const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn png_bytes(marker: &str) -> Vec<u8> {
    let mut data = PNG_HEADER.to_vec();
    data.extend_from_slice(marker.as_bytes());
    data
}

struct MultipartBody(Vec<u8>);

impl MultipartBody {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.0.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.0.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.0.extend_from_slice(data);
        self.0.extend_from_slice(b"\r\n");
        self
    }

    fn build(mut self) -> Vec<u8> {
        self.0.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.0
    }
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn test_state(store: Arc<dyn ObjectStore>, staging_dir: &Path) -> AppState {
    AppState {
        store,
        config: UploadConfig {
            staging_dir: staging_dir.to_path_buf(),
            ..UploadConfig::default()
        },
    }
}

async fn staged_file_count(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut count = 0;
    while let Ok(Some(_)) = entries.next_entry().await {
        count += 1;
    }
    count
}

async fn stored_bytes(store: &MemoryObjectStore, key: &str) -> Vec<u8> {
    let object = store.get(key).await.unwrap();
    object
        .stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn upload_batch_returns_keys_in_input_order() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let body = MultipartBody::new()
        .text("uid", "user-42")
        .file("images", "a.png", &png_bytes("first"))
        .file("images", "b.png", &png_bytes("second"))
        .build();

    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let keys: Vec<String> = json["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k.as_str().unwrap().to_string())
        .collect();

    assert_eq!(keys.len(), 2);
    for key in &keys {
        assert!(key.starts_with("user-42/"), "key not owner-scoped: {key}");
        assert!(key.ends_with(".png"));
    }
    assert_ne!(keys[0], keys[1]);

    // i-th key maps to the i-th input file.
    assert_eq!(stored_bytes(&store, &keys[0]).await, png_bytes("first"));
    assert_eq!(stored_bytes(&store, &keys[1]).await, png_bytes("second"));

    // Staged files never outlive the request.
    assert_eq!(staged_file_count(staging.path()).await, 0);
}

#[tokio::test]
async fn upload_accepts_up_to_seven_files() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let mut body = MultipartBody::new().text("uid", "user-42");
    for i in 0..7 {
        body = body.file("images", &format!("f{i}.png"), &png_bytes(&format!("{i}")));
    }

    let response = app.oneshot(upload_request(body.build())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["keys"].as_array().unwrap().len(), 7);
    assert_eq!(store.len(), 7);
}

#[tokio::test]
async fn legacy_single_file_field_returns_single_key() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let body = MultipartBody::new()
        .text("uid", "user-42")
        .file("image", "only.png", &png_bytes("legacy"))
        .build();

    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let key = json["key"].as_str().unwrap();
    assert!(key.starts_with("user-42/"));
    assert!(json.get("keys").is_none());
    assert!(store.contains(key));
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let body = MultipartBody::new().text("uid", "user-42").build();
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"No files uploaded");
    assert!(store.is_empty());
}

#[tokio::test]
async fn upload_without_uid_deletes_every_staged_file() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    // File parts hit the disk before the missing uid can be noticed.
    let body = MultipartBody::new()
        .file("images", "a.png", &png_bytes("a"))
        .file("images", "b.png", &png_bytes("b"))
        .file("images", "c.png", &png_bytes("c"))
        .build();

    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"No uid provided");

    assert_eq!(staged_file_count(staging.path()).await, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn repeated_uid_failures_do_not_grow_the_staging_dir() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let state = test_state(store.clone(), staging.path());

    for _ in 0..5 {
        let app = create_app(state.clone());
        let body = MultipartBody::new()
            .file("images", "a.png", &png_bytes("a"))
            .build();
        let response = app.oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert_eq!(staged_file_count(staging.path()).await, 0);
}

#[tokio::test]
async fn eight_files_are_rejected_whole_not_truncated() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let mut body = MultipartBody::new().text("uid", "user-42");
    for i in 0..8 {
        body = body.file("images", &format!("f{i}.png"), &png_bytes(&format!("{i}")));
    }

    let response = app.oneshot(upload_request(body.build())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the store and nothing lingers on disk.
    assert!(store.is_empty());
    assert_eq!(staged_file_count(staging.path()).await, 0);
}

#[tokio::test]
async fn non_image_payload_is_rejected_and_cleaned_up() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let app = create_app(test_state(store.clone(), staging.path()));

    let body = MultipartBody::new()
        .text("uid", "user-42")
        .file("images", "ok.png", &png_bytes("fine"))
        .file("images", "evil.png", b"#!/bin/sh\necho pwned\n")
        .build();

    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(store.is_empty());
    assert_eq!(staged_file_count(staging.path()).await, 0);
}

/// Store whose puts fail from the nth call on, for exercising the
/// partial-batch failure path.
struct FailingStore {
    inner: MemoryObjectStore,
    puts: AtomicUsize,
    fail_from: usize,
}

impl FailingStore {
    fn new(fail_from: usize) -> Self {
        Self {
            inner: MemoryObjectStore::new(),
            puts: AtomicUsize::new(0),
            fail_from,
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<String, StoreError> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_from {
            return Err(StoreError::Write("injected failure".to_string()));
        }
        self.inner.put(local_path, key).await
    }

    async fn get(&self, key: &str) -> Result<RetrievedObject, StoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn partial_batch_failure_returns_500_and_leaves_no_orphans() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(FailingStore::new(1));
    let app = create_app(test_state(store.clone(), staging.path()));

    let body = MultipartBody::new()
        .text("uid", "user-42")
        .file("images", "a.png", &png_bytes("a"))
        .file("images", "b.png", &png_bytes("b"))
        .file("images", "c.png", &png_bytes("c"))
        .build();

    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Error uploading images to S3");

    // The member that succeeded before the failure was compensated away,
    // and no staged file survived the request.
    assert!(store.inner.is_empty());
    assert_eq!(staged_file_count(staging.path()).await, 0);
}
