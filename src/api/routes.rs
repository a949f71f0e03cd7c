//! HTTP route handlers for the worker's backend surface (§6).
//!
//! This worker exposes a small, flat surface compared to the rest of this
//! codebase's sprawling REST API: six routes under `/queue/back`, all
//! defined here rather than split into a `routes/` directory per resource.

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::Error;
use crate::ids::{GroupId, TaskId};
use crate::worker::{ChapterTaskOptions, MangaTaskOptions, TaskSnapshot};
use crate::worker::registry::SchedulerCounts;

/// Body accepted by `POST /queue/back/new`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewTaskRequest {
    /// `"manga"` or `"chapter"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The manga or chapter id, as a bare string.
    pub data: String,
    /// Extra per-kind options; shaped like [`MangaTaskOptions`] or
    /// [`ChapterTaskOptions`] depending on `kind`.
    #[serde(default)]
    pub opt_data: Value,
    /// Fairness group the task should be scheduled under.
    pub group: String,
}

/// Response returned by `POST /queue/back/new`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NewTaskResponse {
    pub task_id: TaskId,
}

/// `GET /queue/back` — aggregate scheduler counts.
#[utoipa::path(
    get,
    path = "/queue/back",
    tag = "queue",
    responses(
        (status = 200, description = "Aggregate scheduler counts", body = SchedulerCounts),
    )
)]
pub async fn get_counts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.counts().await)
}

/// `GET /queue/back/ready` — admission-control health check.
#[utoipa::path(
    get,
    path = "/queue/back/ready",
    tag = "queue",
    responses(
        (status = 200, description = "Whether the worker is ready for new work", body = bool),
    )
)]
pub async fn get_ready(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.check_status().await)
}

/// `GET /queue/back/all` — deep dump of every task across every group.
#[utoipa::path(
    get,
    path = "/queue/back/all",
    tag = "queue",
    responses(
        (status = 200, description = "Every task currently tracked by the scheduler", body = Vec<TaskSnapshot>),
    )
)]
pub async fn get_all(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.all_task_snapshots().await)
}

/// `POST /queue/back/new` — job ingress.
#[utoipa::path(
    post,
    path = "/queue/back/new",
    tag = "queue",
    request_body = NewTaskRequest,
    responses(
        (status = 200, description = "Task created", body = NewTaskResponse),
        (status = 400, description = "Unknown task type"),
        (status = 503, description = "Worker is over its configured resource limits"),
    )
)]
pub async fn new_task(
    State(state): State<AppState>,
    Json(body): Json<NewTaskRequest>,
) -> Result<impl IntoResponse, Error> {
    if state.config.backend.enforce_limits && !state.scheduler.check_status().await {
        return Err(Error::NotReady);
    }

    let group = GroupId::new(body.group);
    let task_id = match body.kind.as_str() {
        "manga" => {
            let opts: MangaTaskOptions = if body.opt_data.is_null() {
                MangaTaskOptions::default()
            } else {
                serde_json::from_value(body.opt_data)?
            };
            state.scheduler.create_manga_task(group, body.data, opts).await
        }
        "chapter" => {
            let opts: ChapterTaskOptions = if body.opt_data.is_null() {
                ChapterTaskOptions::default()
            } else {
                serde_json::from_value(body.opt_data)?
            };
            state
                .scheduler
                .create_chapter_task(group, body.data, opts)
                .await
        }
        other => return Err(Error::UnknownTaskType(other.to_string())),
    };

    Ok(Json(NewTaskResponse { task_id }))
}

/// `GET /queue/back/{id}` — one task's current state.
#[utoipa::path(
    get,
    path = "/queue/back/{id}",
    tag = "queue",
    params(("id" = uuid::Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task snapshot", body = TaskSnapshot),
        (status = 404, description = "No such task"),
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<impl IntoResponse, Error> {
    state
        .scheduler
        .task_snapshot(id)
        .await
        .map(Json)
        .ok_or_else(|| Error::TaskNotFound(id.to_string()))
}

/// `DELETE /queue/back/{id}` — cancel a task.
#[utoipa::path(
    delete,
    path = "/queue/back/{id}",
    tag = "queue",
    params(("id" = uuid::Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task cancelled"),
        (status = 404, description = "No such task"),
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<impl IntoResponse, Error> {
    state.scheduler.cancel_task(id).await?;
    Ok(StatusCode::OK)
}

/// `GET /queue/back/{id}/data` — stream the produced archive.
#[utoipa::path(
    get,
    path = "/queue/back/{id}/data",
    tag = "queue",
    params(("id" = uuid::Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Archive bytes", content_type = "application/zip"),
        (status = 403, description = "Task not yet completed or failed"),
        (status = 503, description = "Task kind has no retrievable result"),
    )
)]
pub async fn get_data(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Response, Error> {
    let path: PathBuf = state.scheduler.result_path(id).await?;

    let file = tokio::fs::File::open(&path).await.map_err(Error::Io)?;
    let stream = ReaderStream::new(file);
    let body = axum::body::Body::from_stream(stream);

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("archive.zip")
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
