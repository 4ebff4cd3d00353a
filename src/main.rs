use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod service;
mod store;
#[cfg(test)]
mod test_utils;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use service::SpeechService;
use store::{FileStore, AUDIO_RETENTION};
use tts::{ModelRegistry, OnnxLoader};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let addr = config.bind_address();

    tracing::info!("{} v{}", api::SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    tracing::info!("Models directory: {}", config.models_dir.display());

    let store = match FileStore::open(&config.output_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Output directory: {}", store.root().display());

    let loader = OnnxLoader::new(config.models_dir.clone(), config.onnx_threads);
    let registry = ModelRegistry::new(Arc::new(loader));
    tracing::info!("Using device: {}", registry.device());

    let sweeper = store::spawn_sweeper(store.clone(), config.sweep_interval, AUDIO_RETENTION);

    let state = Arc::new(AppState {
        service: SpeechService::new(registry, store),
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Starting server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    sweeper.abort();
    tracing::info!("Server stopped");
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
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
