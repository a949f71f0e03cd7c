//! The `Action` tagged-sum: every unit of work a task can queue.
//!
//! Mirrors the original source's action classes, but as a closed enum rather
//! than a class hierarchy — matches engine where polymorphic work items are
//! done as plain enums dispatched through a `match`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::worker::actions::{
    add_manga_chapters::AddMangaChaptersAction, archive_contents::ArchiveContentsAction,
    default_cleanup::DefaultCleanupAction, download_chapter::DownloadChapterAction,
    ActionContext,
};

/// One unit of queued work belonging to a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type")]
pub enum Action {
    AddMangaChapters(AddMangaChaptersAction),
    DownloadChapter(DownloadChapterAction),
    ArchiveContents(ArchiveContentsAction),
    DefaultCleanup(DefaultCleanupAction),
}

impl Action {
    /// Run this action to completion. Errors returned here are a last
    /// resort, mirroring the original's unguarded `except Exception` at the
    /// dispatch loop: every *expected* failure is handled inside the action
    /// itself via `ctx.mark_failed` and a subsequent `Ok(())`.
    pub async fn run(&self, ctx: &ActionContext) -> Result<()> {
        match self {
            Action::AddMangaChapters(a) => a.run(ctx).await,
            Action::DownloadChapter(a) => a.run(ctx).await,
            Action::ArchiveContents(a) => a.run(ctx).await,
            Action::DefaultCleanup(a) => a.run(ctx).await,
        }
    }

    /// A short label for logs and status strings.
    pub fn label(&self) -> &'static str {
        match self {
            Action::AddMangaChapters(_) => "AddMangaChapters",
            Action::DownloadChapter(_) => "DownloadChapter",
            Action::ArchiveContents(_) => "ArchiveContents",
            Action::DefaultCleanup(_) => "DefaultCleanup",
        }
    }
}
