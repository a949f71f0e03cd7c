//! The dispatch loop (§4.7): one background worker, one action in flight at
//! a time across the entire process.

use std::sync::atomic::Ordering;

use crate::worker::actions::ActionContext;
use crate::worker::WorkerScheduler;

impl WorkerScheduler {
    /// Spawn the dispatch loop. Runs until [`WorkerScheduler::shutdown`] is
    /// triggered.
    pub fn spawn_dispatch_loop(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.dispatch_alive.store(true, Ordering::SeqCst);

            while !scheduler.shutdown.is_cancelled() {
                let next = {
                    let mut state = scheduler.state.lock().await;
                    state.update_groups();
                    if state.has_queue() {
                        state.next_action()
                    } else {
                        None
                    }
                };

                let Some((group_id, task_id, action)) = next else {
                    tokio::select! {
                        _ = tokio::time::sleep(scheduler.config.timers.scheduler_empty_wait) => {}
                        _ = scheduler.shutdown.cancelled() => {}
                    }
                    continue;
                };

                let ctx = ActionContext {
                    state: scheduler.state.clone(),
                    task_id,
                    group_id: group_id.clone(),
                    config: scheduler.config.clone(),
                    catalog: scheduler.catalog.clone(),
                    cdn: scheduler.cdn.clone(),
                };

                tracing::info!(
                    task_id = %task_id,
                    group = %group_id,
                    action = action.label(),
                    "dispatching action"
                );

                if let Err(e) = action.run(&ctx).await {
                    tracing::error!(task_id = %task_id, group = %group_id, error = %e, "action raised an unhandled error");
                    let mut state = scheduler.state.lock().await;
                    if let Some(task) = state.task_mut(&task_id) {
                        task.failed = true;
                        task.status = format!("A critical error occurred while running the task ({e})");
                        task.queued_actions.clear();
                    }
                }
            }

            scheduler.dispatch_alive.store(false, Ordering::SeqCst);
            tracing::info!("dispatch loop stopped");
        })
    }
}
