//! Worker binary example
//!
//! Wires a [`WorkerScheduler`] to real HTTP-backed catalog/CDN clients, starts
//! its background dispatch and cleanup loops, and serves the worker's backend
//! surface over HTTP until a termination signal arrives.
//!
//! Run with `WORKER_CATALOG__BASE_URL=... cargo run --example run_worker`
//! (once wired into `Cargo.toml`'s `[[example]]` table), or embed this shape
//! directly in a binary crate that depends on `manga-worker` as a library.

use std::sync::Arc;

use manga_worker::cdn::HttpCdnClient;
use manga_worker::catalog::HttpCatalogClient;
use manga_worker::{Config, WorkerScheduler, api, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config_path = std::env::var("WORKER_CONFIG_PATH").ok().map(std::path::PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);

    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog.base_url.clone(),
        config.catalog.request_timeout,
    ));
    let cdn = Arc::new(HttpCdnClient::new(
        config.catalog.base_url.clone(),
        config.cdn.page_timeout,
    ));

    let scheduler = WorkerScheduler::new(config.clone(), catalog, cdn);
    scheduler.spawn_dispatch_loop();
    scheduler.spawn_cleanup_loop();

    let router = api::create_router(scheduler.clone(), config.clone());
    let listener = tokio::net::TcpListener::bind(&config.backend.bind_address).await?;
    tracing::info!(addr = %config.backend.bind_address, "worker listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "http server exited with error");
        }
    });

    run_with_shutdown(scheduler).await;
    server.abort();
    Ok(())
}
