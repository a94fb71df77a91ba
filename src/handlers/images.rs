use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::AppState;
use crate::error::AppError;
use crate::services::staging::{UploadBatch, stage_file};
use crate::services::storage::StoreError;
use crate::utils::validation::is_allowed_image;

/// Content type assumed when the store recorded none for an object.
const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub keys: Vec<String>,
}

/// Shape of the legacy single-file route (`image` field).
#[derive(Serialize, ToSchema)]
pub struct SingleUploadResponse {
    pub key: String,
}

#[derive(Deserialize)]
pub struct GetImageParams {
    /// Historically named; semantically the object key.
    pub date: Option<String>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, content_type = "multipart/form-data", description = "uid field plus `images` file parts (or legacy single `image` part)"),
    responses(
        (status = 200, description = "All files stored", body = UploadResponse),
        (status = 400, description = "No files, no uid, too many files, or non-image payload"),
        (status = 500, description = "Object store write failed")
    )
)]
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut batch = UploadBatch::default();
    let mut legacy_single = false;
    let mut oversized = false;
    let mut non_image = false;

    // The parser writes file parts to disk as they arrive, before the uid
    // field can be seen, so every early return below must drain the batch.
    let parsed: Result<(), AppError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "uid" => {
                    batch.uid = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?
                        .trim()
                        .to_string();
                }
                "image" | "images" => {
                    legacy_single |= name == "image";
                    let original_name = field.file_name().unwrap_or("unnamed").to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;

                    oversized |= data.len() > state.config.max_file_size;
                    non_image |= !is_allowed_image(&data);

                    let staged = stage_file(&state.config.staging_dir, &original_name, &data)
                        .await
                        .map_err(|e| AppError::Internal(e.into()))?;
                    batch.files.push(staged);
                }
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = parsed {
        batch.cleanup().await;
        return Err(e);
    }
    if batch.files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }
    if batch.uid.is_empty() {
        batch.cleanup().await;
        return Err(AppError::BadRequest("No uid provided".to_string()));
    }
    if batch.files.len() > state.config.max_files_per_batch {
        batch.cleanup().await;
        return Err(AppError::BadRequest(format!(
            "Too many files uploaded (max {})",
            state.config.max_files_per_batch
        )));
    }
    if oversized {
        batch.cleanup().await;
        return Err(AppError::BadRequest("File too large".to_string()));
    }
    if non_image {
        batch.cleanup().await;
        return Err(AppError::BadRequest(
            "Only image uploads are allowed".to_string(),
        ));
    }

    // Fan out the puts together and wait for all of them to settle, so
    // every already-written member is known if one fails.
    let keys = batch.keys();
    let uploads = batch
        .files
        .iter()
        .zip(&keys)
        .map(|(file, key)| state.store.put(&file.path, key));
    let results = futures::future::join_all(uploads).await;

    if results.iter().any(|r| r.is_err()) {
        // Compensating delete: objects written for a failed batch are
        // orphans (no key list ever reaches the caller), drop them.
        for (key, result) in keys.iter().zip(&results) {
            if result.is_ok() {
                if let Err(e) = state.store.delete(key).await {
                    tracing::warn!(key = %key, "failed to delete orphaned object: {}", e);
                }
            }
        }
        batch.cleanup().await;
        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            return Err(AppError::UploadFailed(err));
        }
        return Err(AppError::UploadFailed(StoreError::Write(
            "batch failed".to_string(),
        )));
    }

    batch.cleanup().await;
    tracing::info!(uid = %batch.uid, count = keys.len(), "uploaded batch");

    if legacy_single && keys.len() == 1 {
        let key = keys.into_iter().next().unwrap_or_default();
        return Ok(Json(SingleUploadResponse { key }).into_response());
    }
    Ok(Json(UploadResponse { keys }).into_response())
}

#[utoipa::path(
    get,
    path = "/upload/get",
    params(
        ("date" = String, Query, description = "Object key, `{uid}/{fileName}`")
    ),
    responses(
        (status = 200, description = "Object bytes, Content-Type/Content-Length from store metadata"),
        (status = 400, description = "Missing key parameter"),
        (status = 500, description = "Key unknown or store unreachable")
    )
)]
pub async fn get_image(
    State(state): State<AppState>,
    Query(params): Query<GetImageParams>,
) -> Result<Response, AppError> {
    let key = params
        .date
        .filter(|k| !k.is_empty())
        .ok_or(AppError::MissingParameters)?;

    let object = state.store.get(&key).await.map_err(|e| {
        tracing::error!(key = %key, "store read failed: {}", e);
        AppError::NoResponseFromStore
    })?;

    let content_type = object
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let mut builder = Response::builder().header(header::CONTENT_TYPE, content_type);
    if let Some(length) = object.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    // The stream is piped straight through; an error after the headers
    // have been flushed cuts the connection short, no second response.
    builder
        .body(Body::from_stream(object.stream))
        .map_err(|e| AppError::Internal(e.into()))
}

#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Liveness check"))
)]
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "connected" }))
}
