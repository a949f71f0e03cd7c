//! Action implementations and the shared context they run against.

pub mod add_manga_chapters;
pub mod archive_contents;
pub mod default_cleanup;
pub mod download_chapter;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::catalog::CatalogClient;
use crate::cdn::CdnClient;
use crate::config::Config;
use crate::ids::{GroupId, TaskId};
use crate::worker::action::Action;
use crate::worker::registry::SchedulerState;

/// Everything an action needs to talk back to the scheduler and the outside
/// world, handed to `Action::run` by the dispatch loop.
///
/// Every method that touches scheduler state acquires the mutex briefly and
/// releases it before returning; none of them hold the lock across an
/// `.await` on outbound I/O (§5).
pub struct ActionContext {
    pub state: Arc<Mutex<SchedulerState>>,
    pub task_id: TaskId,
    pub group_id: GroupId,
    pub config: Arc<Config>,
    pub catalog: Arc<dyn CatalogClient>,
    pub cdn: Arc<dyn CdnClient>,
}

impl ActionContext {
    /// Update the task's live status string (overridden for display by
    /// `status_override` if one is set, but this always writes `status`).
    pub async fn set_status(&self, status: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(&self.task_id) {
            task.status = status.into();
        }
    }

    /// Mark the task as having started (first action picked up by dispatch).
    pub async fn mark_started(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(&self.task_id) {
            task.started = true;
        }
    }

    /// Fail the task with a descriptive status. Draining `queued_actions`
    /// keeps the invariant that a failed task has no outstanding work, so
    /// `update_tasks` evicts it from the active/queued rotation.
    pub async fn mark_failed(&self, status: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(&self.task_id) {
            task.failed = true;
            task.status = status.into();
            task.queued_actions.clear();
        }
    }

    /// Mark the task as completed with a result path and final status.
    pub async fn mark_completed(&self, result: impl Into<String>, status: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(&self.task_id) {
            task.completed = true;
            task.result = Some(result.into());
            task.status = status.into();
        }
    }

    /// Append a follow-on action to this task (e.g. `AddMangaChapters`
    /// expanding into `DownloadChapter` + `ArchiveContents`).
    pub async fn append_action(&self, action: Action) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(&self.task_id) {
            task.add_action(action);
        }
    }

    /// Whether the task has already been marked failed (checked by
    /// long-running actions between page fetches to honor cooperative
    /// cancellation without interrupting in-flight I/O).
    pub async fn is_failed(&self) -> bool {
        let state = self.state.lock().await;
        state.task(&self.task_id).map(|t| t.failed).unwrap_or(true)
    }

    /// Absolute path to this task's working directory.
    pub fn task_working_dir(&self) -> PathBuf {
        self.config.temp_dir().join(self.task_id.to_string())
    }
}
