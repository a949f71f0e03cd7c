//! The cleanup loop (§4.8): TTL-based reclamation of tasks and the groups
//! they leave empty behind them.

use std::sync::atomic::Ordering;

use crate::ids::{GroupId, TaskId};
use crate::worker::action::Action;
use crate::worker::actions::ActionContext;
use crate::worker::WorkerScheduler;

impl WorkerScheduler {
    /// Spawn the cleanup loop. Runs until [`WorkerScheduler::shutdown`] is
    /// triggered.
    pub fn spawn_cleanup_loop(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.cleanup_alive.store(true, Ordering::SeqCst);

            while !scheduler.shutdown.is_cancelled() {
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.config.timers.cleanup_interval) => {
                        scheduler.run_cleanup_pass().await;
                    }
                    _ = scheduler.shutdown.cancelled() => {}
                }
            }

            scheduler.cleanup_alive.store(false, Ordering::SeqCst);
            tracing::info!("cleanup loop stopped");
        })
    }

    /// Run one cleanup pass immediately (also used directly by tests).
    pub async fn run_cleanup_pass(&self) {
        let task_ttl = self.config.timers.task_ttl;
        let empty_ttl = self.config.timers.task_empty_ttl;

        let expired: Vec<(GroupId, TaskId, Action)> = {
            let state = self.state.lock().await;
            let mut out = Vec::new();
            for group in state.groups() {
                for task in group.tasks() {
                    let age = task.created_instant.elapsed();
                    let expired = if !task.actions.is_empty() {
                        age > task_ttl
                    } else {
                        age > empty_ttl
                    };
                    if expired {
                        out.push((group.id.clone(), task.id, task.get_cleanup_action()));
                    }
                }
            }
            out
        };

        for (group_id, task_id, cleanup_action) in expired {
            let ctx = ActionContext {
                state: self.state.clone(),
                task_id,
                group_id: group_id.clone(),
                config: self.config.clone(),
                catalog: self.catalog.clone(),
                cdn: self.cdn.clone(),
            };

            if let Err(e) = cleanup_action.run(&ctx).await {
                tracing::warn!(task_id = %task_id, error = %e, "cleanup action failed");
            }

            let mut state = self.state.lock().await;
            state.delete_task(&task_id);
            tracing::info!(task_id = %task_id, group = %group_id, "task reclaimed by cleanup");
        }
    }
}
