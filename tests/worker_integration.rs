//! End-to-end test of the worker scheduler against mocked catalog/CDN HTTP
//! endpoints: task ingress, the dispatch loop, chapter download, archiving,
//! and result retrieval.

use std::sync::Arc;
use std::time::Duration;

use manga_worker::cdn::HttpCdnClient;
use manga_worker::catalog::HttpCatalogClient;
use manga_worker::{Config, GroupId, WorkerScheduler};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str, temp_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.catalog.base_url = base_url.to_string();
    config.backend.temp_path = temp_dir.to_path_buf();
    config.backend.retry.min_chapter_duration = Duration::from_millis(0);
    config.backend.retry.delay = Duration::from_millis(10);
    config.timers.scheduler_empty_wait = Duration::from_millis(20);
    config
}

async fn wait_until_terminal(scheduler: &WorkerScheduler, task_id: manga_worker::TaskId) {
    for _ in 0..200 {
        if let Some(snap) = scheduler.task_snapshot(task_id).await {
            if snap.completed || snap.failed {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task did not reach a terminal state within the test deadline");
}

#[tokio::test]
async fn single_chapter_task_downloads_pages_and_produces_an_archive() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chapter/ch-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "ch-1",
            "chapter": "1",
            "volume": "1",
            "title": "Beginnings",
            "groups": ["scanlators"],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/at-home/server/ch-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "baseUrl": server.uri(),
            "chapter": {
                "data": ["page1.png", "page2.png"],
                "dataSaver": ["page1.png", "page2.png"],
                "hash": "abc123",
            },
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/abc123/page1.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/abc123/page2.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![4u8, 5, 6]))
        .mount(&server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(&server.uri(), temp_dir.path()));

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

    let task_id = scheduler
        .create_chapter_task(
            GroupId::new("127.0.0.1"),
            "ch-1".to_string(),
            Default::default(),
        )
        .await;

    wait_until_terminal(&scheduler, task_id).await;

    let snapshot = scheduler.task_snapshot(task_id).await.unwrap();
    assert!(!snapshot.failed, "task failed: {:?}", snapshot.status);
    assert!(snapshot.completed);

    let archive_path = scheduler.result_path(task_id).await.unwrap();
    assert!(archive_path.exists());
    assert_eq!(archive_path.file_name().unwrap(), "archive.zip");

    scheduler.shutdown();
}

#[tokio::test]
async fn cancelling_a_task_before_dispatch_marks_it_not_retrievable() {
    let server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(&server.uri(), temp_dir.path()));

    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog.base_url.clone(),
        config.catalog.request_timeout,
    ));
    let cdn = Arc::new(HttpCdnClient::new(
        config.catalog.base_url.clone(),
        config.cdn.page_timeout,
    ));
    let scheduler = WorkerScheduler::new(config.clone(), catalog, cdn);

    let task_id = scheduler
        .create_chapter_task(GroupId::new("127.0.0.1"), "ch-1".to_string(), Default::default())
        .await;

    scheduler.cancel_task(task_id).await.unwrap();

    let err = scheduler.result_path(task_id).await.unwrap_err();
    assert!(matches!(err, manga_worker::Error::NotRetrievable(_)));
}
