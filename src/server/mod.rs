use crate::cache::{hours, start_cleanup_task};
use crate::config::Config;
use crate::conversion::TranscodeManager;
use crate::streaming;
use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod routes_api;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub transcoder: Arc<TranscodeManager>,
}

impl AppContext {
    pub fn new(config: Config, transcoder: TranscodeManager) -> Self {
        Self {
            config: Arc::new(config),
            transcoder: Arc::new(transcoder),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/media", streaming::media_router())
        .nest("/cache", routes_api::cache_routes())
        .nest("/api", routes_api::api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let transcoder = TranscodeManager::new(&config)?;

    let cleanup = if config.cache.cleanup_interval_minutes > 0 {
        Some(start_cleanup_task(
            transcoder.cache().clone(),
            Duration::from_secs(config.cache.cleanup_interval_minutes * 60),
            hours(config.cache.max_age_hours),
        ))
    } else {
        tracing::info!("Periodic cache cleanup disabled");
        None
    };

    tracing::info!(
        media_root = %config.media.root.display(),
        cache_dir = %config.cache.dir.display(),
        "Serving media"
    );

    let app = create_router(AppContext::new(config, transcoder));

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = cleanup {
        task.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
