//! Packages a task's working directory into `archive.zip` (§4.6).

use serde::{Deserialize, Serialize};

use crate::archive;
use crate::error::Result;
use crate::worker::actions::ActionContext;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ArchiveContentsAction;

impl ArchiveContentsAction {
    pub async fn run(&self, ctx: &ActionContext) -> Result<()> {
        ctx.mark_started().await;
        ctx.set_status("Packaging archive").await;

        let dir = ctx.task_working_dir();
        let task_id = ctx.task_id;
        let archive_path = tokio::task::spawn_blocking(move || -> Result<std::path::PathBuf> {
            let path = archive::write_zip(&dir)?;
            archive::prune_sources(&dir)?;
            Ok(path)
        })
        .await
        .map_err(|e| crate::error::Error::Other(format!("archive task panicked: {e}")))??;

        tracing::info!(task_id = %task_id, path = %archive_path.display(), "archive packaged");
        ctx.mark_completed(
            archive_path.display().to_string(),
            "Task is ready for download",
        )
        .await;
        Ok(())
    }
}
