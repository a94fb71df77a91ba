use axum::http::{HeaderValue, Method};
use dotenvy::dotenv;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use work_image_service::infrastructure::storage;
use work_image_service::{AppState, config, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "work_image_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting work image service...");

    let upload_config = config::UploadConfig::from_env();
    let storage_config = config::StorageConfig::from_env()?;
    let store = storage::setup_storage(&storage_config).await;

    info!(
        "🖼️  Upload limits: {} files per batch, {}MB per file",
        upload_config.max_files_per_batch,
        upload_config.max_file_size / 1024 / 1024,
    );

    let cors = CorsLayer::new()
        .allow_origin(upload_config.host_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST]);

    let state = AppState {
        store,
        config: upload_config.clone(),
    };

    let app = create_app(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            // Whole multipart body: every file plus form overhead.
            upload_config.max_file_size * upload_config.max_files_per_batch + 64 * 1024,
        ));

    let addr = SocketAddr::from(([0, 0, 0, 0], 3030));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
