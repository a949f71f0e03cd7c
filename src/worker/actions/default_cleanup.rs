//! The fallback cleanup action: remove a task's working directory.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::worker::actions::ActionContext;

/// Removes the task's working directory. Errors are ignored — by the time
/// cleanup runs, the directory may already be gone (e.g. `ArchiveContents`
/// already pruned everything but the archive).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DefaultCleanupAction;

impl DefaultCleanupAction {
    pub async fn run(&self, ctx: &ActionContext) -> Result<()> {
        let dir = ctx.task_working_dir();
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(task_id = %ctx.task_id, path = %dir.display(), error = %e, "cleanup failed to remove working directory");
            }
        }
        Ok(())
    }
}
