use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::services::storage::StoreError;

/// Errors the HTTP boundary translates into status codes. Bodies stay
/// plain text because the historical front-end surfaces them verbatim.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Error: missing parameters")]
    MissingParameters,

    #[error("Error uploading images to S3")]
    UploadFailed(StoreError),

    #[error("Error: No response from S3")]
    NoResponseFromStore,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::MissingParameters => StatusCode::BAD_REQUEST,
            AppError::UploadFailed(e) => {
                tracing::error!("upload to store failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NoResponseFromStore => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}
