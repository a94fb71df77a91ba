pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::storage::ObjectStore;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::images::upload_images,
        handlers::images::get_image,
        handlers::images::ping,
    ),
    components(
        schemas(
            handlers::images::UploadResponse,
            handlers::images::SingleUploadResponse,
        )
    ),
    tags(
        (name = "images", description = "Image upload and retrieval endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/upload", post(handlers::images::upload_images))
        .route("/upload/get", get(handlers::images::get_image))
        .route("/ping", get(handlers::images::ping))
        .with_state(state)
}
