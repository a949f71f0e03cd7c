//! Application state for the worker's HTTP server.

use std::sync::Arc;

use crate::config::Config;
use crate::worker::WorkerScheduler;

/// Shared application state accessible to all route handlers.
///
/// Cloned for each request (cheap `Arc` clone); the scheduler itself is also
/// clone-cheap so this is effectively two pointer copies per request.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the worker's job scheduler.
    pub scheduler: WorkerScheduler,

    /// Read access to the running configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new `AppState`.
    pub fn new(scheduler: WorkerScheduler, config: Arc<Config>) -> Self {
        Self { scheduler, config }
    }
}
