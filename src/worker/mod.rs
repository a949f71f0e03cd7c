//! The worker scheduler: the in-memory job tree, its fair dispatch and
//! cleanup loops, and the admission-control gate in front of new work.
//!
//! - [`registry`] — the scheduler/group/task data model and its round-robin
//!   rotation discipline (§3, §4.1-4.3).
//! - [`action`] — the polymorphic unit of work tasks queue (§3).
//! - [`actions`] — the four action implementations and their shared context
//!   (§4.4-4.6, §4.3's `DefaultCleanup`).
//! - [`dispatch`] — the single background dispatch loop (§4.7).
//! - [`cleanup`] — the TTL-based reclamation loop (§4.8).
//! - [`admission`] — `check_status()` resource-limit gate (§4.9).

pub mod action;
pub mod actions;
pub mod admission;
pub mod cleanup;
pub mod dispatch;
pub mod registry;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use action::Action;
use actions::add_manga_chapters::AddMangaChaptersAction;
use actions::archive_contents::ArchiveContentsAction;
use actions::download_chapter::DownloadChapterAction;
use crate::catalog::CatalogClient;
use crate::cdn::CdnClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::{GroupId, TaskId};
use registry::{SchedulerCounts, SchedulerState, Task};

/// A handle to one worker's job scheduler. Cheap to clone — every field is
/// an `Arc`, so cloning just shares the same underlying state, the way the
/// adapted codebase's own `UsenetDownloader` handle works.
#[derive(Clone)]
pub struct WorkerScheduler {
    state: Arc<Mutex<SchedulerState>>,
    config: Arc<Config>,
    catalog: Arc<dyn CatalogClient>,
    cdn: Arc<dyn CdnClient>,
    dispatch_alive: Arc<AtomicBool>,
    cleanup_alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

/// Options accepted alongside a manga-level ingress request.
#[derive(Clone, Debug, serde::Deserialize, ToSchema)]
pub struct MangaTaskOptions {
    #[serde(default)]
    pub light: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub append_titles: bool,
    #[serde(default)]
    pub preferred_groups: Vec<String>,
    #[serde(default)]
    pub groups_substitute: bool,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

impl Default for MangaTaskOptions {
    fn default() -> Self {
        Self {
            light: false,
            language: default_language(),
            append_titles: false,
            preferred_groups: Vec::new(),
            groups_substitute: false,
            start: None,
            end: None,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Options accepted alongside a single-chapter ingress request.
#[derive(Clone, Debug, Default, serde::Deserialize, ToSchema)]
pub struct ChapterTaskOptions {
    #[serde(default)]
    pub light: bool,
    #[serde(default)]
    pub append_title: bool,
}

/// A point-in-time, fully-owned view of a task, suitable for JSON
/// serialization at the HTTP boundary. Unlike the adapted codebase's
/// Python source, every field here is already plain data — there is no
/// "serializable vs unserializable" split to make explicit, because actions
/// hold no live handles between runs (§9 design note).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub group: GroupId,
    pub kind: String,
    pub actions: Vec<Action>,
    pub queued_actions: usize,
    pub started: bool,
    pub completed: bool,
    pub failed: bool,
    pub status: String,
    pub result: Option<String>,
    pub progress: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskSnapshot {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            group: task.group.clone(),
            kind: task.kind.clone(),
            actions: task.actions.clone(),
            queued_actions: task.queued_actions.len(),
            started: task.started,
            completed: task.completed,
            failed: task.failed,
            status: task.display_status().to_string(),
            result: task.result.clone(),
            progress: task.progress(),
            created_at: task.created_at,
        }
    }
}

impl WorkerScheduler {
    /// Build a scheduler around the given configuration and external
    /// clients. Background loops are not started until
    /// [`WorkerScheduler::spawn_dispatch_loop`] /
    /// [`WorkerScheduler::spawn_cleanup_loop`] are called.
    pub fn new(config: Arc<Config>, catalog: Arc<dyn CatalogClient>, cdn: Arc<dyn CdnClient>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::new())),
            config,
            catalog,
            cdn,
            dispatch_alive: Arc::new(AtomicBool::new(false)),
            cleanup_alive: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop both background loops at their next suspension point.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Create a manga-level task: seeds one `AddMangaChapters` action, which
    /// expands into per-chapter downloads once the dispatch loop runs it.
    pub async fn create_manga_task(
        &self,
        group: GroupId,
        manga_id: String,
        opts: MangaTaskOptions,
    ) -> TaskId {
        let seed = Action::AddMangaChapters(AddMangaChaptersAction {
            manga_id,
            light: opts.light,
            language: opts.language,
            append_titles: opts.append_titles,
            preferred_groups: opts.preferred_groups,
            groups_substitute: opts.groups_substitute,
            start: opts.start,
            end: opts.end,
        });

        let mut state = self.state.lock().await;
        let task_id = state.create_task(group.clone(), "download_archive", seed);
        tracing::info!(task_id = %task_id, group = %group, "manga task created");
        task_id
    }

    /// Create a single-chapter task: seeds one `DownloadChapter` action
    /// followed directly by `ArchiveContents` (no catalog expansion needed).
    pub async fn create_chapter_task(
        &self,
        group: GroupId,
        chapter_id: String,
        opts: ChapterTaskOptions,
    ) -> TaskId {
        let seed = Action::DownloadChapter(DownloadChapterAction {
            chapter_id,
            data_obj: None,
            light: opts.light,
            subfolder: false,
            append_title: opts.append_title,
            volume_dedupe: false,
        });

        let mut state = self.state.lock().await;
        let task_id = state.create_task(group.clone(), "download_archive", seed);
        if let Some(task) = state.task_mut(&task_id) {
            task.add_action(Action::ArchiveContents(ArchiveContentsAction));
        }
        tracing::info!(task_id = %task_id, group = %group, "chapter task created");
        task_id
    }

    /// Fetch a point-in-time snapshot of one task.
    pub async fn task_snapshot(&self, task_id: TaskId) -> Option<TaskSnapshot> {
        let state = self.state.lock().await;
        state.task(&task_id).map(TaskSnapshot::from_task)
    }

    /// Deep dump of every task across every group, for `/queue/back/all`.
    pub async fn all_task_snapshots(&self) -> Vec<TaskSnapshot> {
        let state = self.state.lock().await;
        state
            .groups()
            .flat_map(|g| g.tasks())
            .map(TaskSnapshot::from_task)
            .collect()
    }

    /// Aggregate counts for `/queue/back`.
    pub async fn counts(&self) -> SchedulerCounts {
        self.state.lock().await.counts()
    }

    /// Cooperatively cancel a task: sets `failed` and a display override.
    /// The currently-running action (if any) is not interrupted; it simply
    /// stops being picked up again once `update_groups` runs.
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state
            .task_mut(&task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        task.failed = true;
        task.status_override = Some("Task execution cancelled".to_string());
        task.queued_actions.clear();
        tracing::info!(task_id = %task_id, "task cancelled");
        Ok(())
    }

    /// Resolve the archive path for a completed task, or the appropriate
    /// domain error for every other terminal/non-terminal state (§6
    /// `/queue/back/{id}/data`).
    pub async fn result_path(&self, task_id: TaskId) -> Result<std::path::PathBuf> {
        let state = self.state.lock().await;
        let task = state
            .task(&task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        if task.failed {
            return Err(Error::NotRetrievable(task_id.to_string()));
        }
        if !task.completed {
            return Err(Error::NotRetrievable(task_id.to_string()));
        }
        task.result
            .clone()
            .map(std::path::PathBuf::from)
            .ok_or_else(|| Error::NoResult(task_id.to_string()))
    }
}
