//! HTTP server setup and routing.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::handlers;
use crate::reload::start_index_watcher;
use crate::state::AppState;

/// The registry API over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .route("/search", get(handlers::search_packages))
        .route("/categories", get(handlers::list_categories))
        .route("/package/{name}/{version}", get(handlers::package_info))
        .route("/package/{name}/{version}/", get(handlers::package_info))
        .route("/epr/{name}/{file}", get(handlers::download_archive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the index, then serve until interrupted.
///
/// An index that fails to build stops startup; nothing is served from a
/// partial store.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;
    let watch = config.watch;
    info!(
        roots = ?config.package_paths,
        cache_time = config.cache_time,
        "Starting package registry"
    );

    let state = tokio::task::spawn_blocking(move || AppState::build(config))
        .await
        .context("Index build task failed")?
        .map_err(|e| {
            error!(error = %e, path = %e.path().display(), "Failed to build package index");
            anyhow::Error::new(e).context("Failed to build package index")
        })?;
    let state = Arc::new(state);

    if watch {
        start_index_watcher(Arc::clone(&state))?;
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let index = state.snapshot();
    info!(
        addr = %addr,
        packages = index.name_count(),
        versions = index.len(),
        categories = state.categories.len(),
        "Package registry listening"
    );
    drop(index);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Package registry stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
