//! OpenAPI documentation and schema generation for the worker's HTTP surface.

use utoipa::OpenApi;

/// OpenAPI documentation for the worker's backend routes (§6).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "manga-worker backend API",
        version = "0.1.0",
        description = "Worker-side job scheduler surface: job ingress, task introspection, and archive retrieval",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::api::routes::get_counts,
        crate::api::routes::get_ready,
        crate::api::routes::get_all,
        crate::api::routes::new_task,
        crate::api::routes::get_task,
        crate::api::routes::delete_task,
        crate::api::routes::get_data,
    ),
    components(schemas(
        crate::worker::registry::SchedulerCounts,
        crate::worker::TaskSnapshot,
        crate::worker::MangaTaskOptions,
        crate::worker::ChapterTaskOptions,
        crate::worker::action::Action,
        crate::api::routes::NewTaskRequest,
        crate::api::routes::NewTaskResponse,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "queue", description = "Job ingress, task introspection, cancellation, and archive retrieval"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the bearer-token security scheme to the generated spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "bearer_token",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_doc_generates_without_panicking() {
        let _spec = ApiDoc::openapi();
    }

    #[test]
    fn openapi_spec_has_queue_paths() {
        let spec = ApiDoc::openapi();
        assert!(!spec.paths.paths.is_empty());
    }

    #[test]
    fn openapi_spec_has_bearer_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components should be present");
        assert!(components.security_schemes.contains_key("bearer_token"));
    }
}
