//! Integration tests for the worker's HTTP backend surface, driven through
//! the router in-process via `tower::ServiceExt::oneshot` rather than a real
//! TCP listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use manga_worker::cdn::HttpCdnClient;
use manga_worker::catalog::HttpCatalogClient;
use manga_worker::{Config, WorkerScheduler, api};
use tower::ServiceExt;

fn test_scheduler(config: &Arc<Config>) -> WorkerScheduler {
    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog.base_url.clone(),
        config.catalog.request_timeout,
    ));
    let cdn = Arc::new(HttpCdnClient::new(
        config.catalog.base_url.clone(),
        config.cdn.page_timeout,
    ));
    WorkerScheduler::new(config.clone(), catalog, cdn)
}

#[tokio::test]
async fn full_task_lifecycle_through_http() {
    let config = Arc::new(Config::default());
    let scheduler = test_scheduler(&config);
    let router = api::create_router(scheduler, config);

    let create_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/back/new")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "type": "chapter",
                        "data": "ch-1",
                        "group": "127.0.0.1",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(create_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let task_id = created["task_id"].as_str().unwrap();

    let get_response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/queue/back/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);

    let delete_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/queue/back/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_response.status(), StatusCode::OK);

    let missing_response = router
        .oneshot(
            Request::builder()
                .uri("/queue/back/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing_response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_task_type_is_rejected() {
    let config = Arc::new(Config::default());
    let scheduler = test_scheduler(&config);
    let router = api::create_router(scheduler, config);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/back/new")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "type": "not-a-real-kind",
                        "data": "ch-1",
                        "group": "127.0.0.1",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enforce_limits_rejects_new_tasks_while_background_loops_are_not_running() {
    // `check_status()` treats a dead/unstarted dispatch or cleanup loop as
    // not-ready; this scheduler never calls `spawn_dispatch_loop`/
    // `spawn_cleanup_loop`, so admission must refuse new work.
    let mut config = Config::default();
    config.backend.enforce_limits = true;
    let config = Arc::new(config);
    let scheduler = test_scheduler(&config);
    let router = api::create_router(scheduler, config);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/back/new")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "type": "chapter",
                        "data": "ch-1",
                        "group": "127.0.0.1",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
