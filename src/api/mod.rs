//! The worker's HTTP backend surface (§6): six routes under `/queue/back`
//! in front of the [`crate::worker::WorkerScheduler`].

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::worker::WorkerScheduler;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Build the router for this worker's backend surface.
///
/// Routes:
/// - `GET /queue/back` — aggregate scheduler counts
/// - `GET /queue/back/ready` — admission-control health check
/// - `GET /queue/back/all` — deep dump of every task
/// - `POST /queue/back/new` — job ingress
/// - `GET /queue/back/{id}` — task snapshot
/// - `DELETE /queue/back/{id}` — cancel a task
/// - `GET /queue/back/{id}/data` — archive retrieval
///
/// When `backend.always_allow_retrieve` is set, `/queue/back/{id}/data` is
/// merged back in unlayered so it bypasses bearer-token auth even when the
/// rest of the surface requires it (§6 worker selection relies on this for
/// proxying archive bytes through an unauthenticated frontend leg).
pub fn create_router(scheduler: WorkerScheduler, config: Arc<Config>) -> Router {
    let state = AppState::new(scheduler, config.clone());

    let data_route = Router::new().route("/queue/back/:id/data", get(routes::get_data));

    let mut router = Router::new()
        .route("/queue/back", get(routes::get_counts))
        .route("/queue/back/ready", get(routes::get_ready))
        .route("/queue/back/all", get(routes::get_all))
        .route("/queue/back/new", post(routes::new_task))
        .route("/queue/back/:id", get(routes::get_task))
        .route("/queue/back/:id", delete(routes::delete_task));

    if !config.backend.always_allow_retrieve {
        router = router.merge(data_route.clone());
    }

    if let Some(token) = config.backend.auth_token.clone() {
        router = router.layer(middleware::from_fn_with_state(
            Some(token),
            auth::require_bearer_token,
        ));
    }

    if config.backend.always_allow_retrieve {
        router = router.merge(data_route);
    }

    let router = router.with_state(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    if config.backend.hide_from_openapi {
        router
    } else {
        router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
    }
}
