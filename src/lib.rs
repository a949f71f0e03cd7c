//! # manga-worker
//!
//! Worker-side job scheduler for a distributed manga chapter downloader.
//!
//! ## Design Philosophy
//!
//! - **Fair** — a two-level round-robin (groups, then tasks within a group)
//!   keeps one noisy client from starving another.
//! - **Single-flight dispatch** — one action runs at a time across the whole
//!   process; an action's own internal concurrency (e.g. page downloads) is
//!   its business, not the scheduler's.
//! - **Library-first** — no CLI, purely a crate embedding a scheduler plus an
//!   optional HTTP surface for a frontend dispatcher to drive it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use manga_worker::{Config, WorkerScheduler, run_with_shutdown};
//! use manga_worker::catalog::HttpCatalogClient;
//! use manga_worker::cdn::HttpCdnClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load(None)?);
//!     let catalog = Arc::new(HttpCatalogClient::new(
//!         config.catalog.base_url.clone(),
//!         config.catalog.request_timeout,
//!     ));
//!     let cdn = Arc::new(HttpCdnClient::new(
//!         config.catalog.base_url.clone(),
//!         config.cdn.page_timeout,
//!     ));
//!
//!     let scheduler = WorkerScheduler::new(config.clone(), catalog, cdn);
//!     scheduler.spawn_dispatch_loop();
//!     scheduler.spawn_cleanup_loop();
//!
//!     run_with_shutdown(scheduler).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module: the worker's own HTTP backend surface (§6).
pub mod api;
/// ZIP archive packaging for completed tasks.
pub mod archive;
/// External manga catalog metadata client.
pub mod catalog;
/// External per-chapter content-delivery network client.
pub mod cdn;
/// Configuration types.
pub mod config;
/// Error types.
pub mod error;
/// Task and group identifier newtypes.
pub mod ids;
/// The scheduler: job registry, dispatch/cleanup loops, admission control.
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use ids::{GroupId, TaskId};
pub use worker::{ChapterTaskOptions, MangaTaskOptions, TaskSnapshot, WorkerScheduler};

/// Run until a termination signal arrives, then stop the scheduler's
/// background loops.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(scheduler: WorkerScheduler) {
    wait_for_signal().await;
    scheduler.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM");
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("received SIGINT (Ctrl+C)");
            } else {
                tracing::error!("could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("received SIGTERM");
            } else {
                tracing::error!("could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received Ctrl+C");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    }
}
