//! Concurrent per-page chapter download with retry and rate limiting (§4.5).

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::catalog::ChapterInfo;
use crate::cdn::{PageAssignment, PageReport};
use crate::error::{CdnError, Error, Result};
use crate::worker::actions::ActionContext;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DownloadChapterAction {
    pub chapter_id: String,
    /// Metadata fetched ahead of time by `AddMangaChapters`, when available,
    /// so this action doesn't re-query the catalog.
    #[serde(default)]
    pub data_obj: Option<ChapterInfo>,
    pub light: bool,
    /// Write pages under a `Ch.X (...)` subdirectory rather than directly in
    /// the task's working directory. Set by `AddMangaChapters` for
    /// multi-chapter expansions; false for a single-chapter task.
    pub subfolder: bool,
    pub append_title: bool,
    pub volume_dedupe: bool,
}

impl DownloadChapterAction {
    pub async fn run(&self, ctx: &ActionContext) -> Result<()> {
        ctx.mark_started().await;

        let working_dir = ctx.task_working_dir();
        tokio::fs::create_dir_all(&working_dir).await?;

        let t1 = Instant::now();

        let chapter = match &self.data_obj {
            Some(c) => c.clone(),
            None => match ctx.catalog.get_chapter(&self.chapter_id).await {
                Ok(c) => c,
                Err(e) => {
                    ctx.mark_failed(format!("Failed to fetch chapter metadata: {e}"))
                        .await;
                    return Ok(());
                }
            },
        };

        let target_dir = if self.subfolder {
            working_dir.join(build_subdir_name(self, &chapter))
        } else {
            working_dir.clone()
        };
        tokio::fs::create_dir_all(&target_dir).await?;

        let assignment = match ctx.cdn.get_network(&self.chapter_id, self.light).await {
            Ok(a) => a,
            Err(e) => {
                ctx.mark_failed(format!("Failed to obtain CDN network assignment: {e}"))
                    .await;
                return Ok(());
            }
        };
        let n_pages = assignment.pages.len();

        if n_pages > 0 {
            let width = n_pages.to_string().len().max(1);
            let chapter_label = chapter.chapter.clone().unwrap_or_else(|| "?".into());
            let volume_label = chapter.volume.clone().unwrap_or_else(|| "?".into());
            let completed = AtomicU32::new(0);
            let cancelled = AtomicBool::new(false);
            let mut last_err: Option<Error> = None;

            let mut stream = stream::iter(0..n_pages)
                .map(|index| {
                    download_one_page(
                        ctx,
                        assignment.clone(),
                        &self.chapter_id,
                        self.light,
                        index,
                        n_pages,
                        width,
                        &target_dir,
                        &cancelled,
                    )
                })
                .buffer_unordered(n_pages);

            while let Some(result) = stream.next().await {
                match result {
                    Ok(()) => {
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        ctx.set_status(format!(
                            "Downloading Vol.{volume_label} Ch.{chapter_label} p.{done}/{n_pages}"
                        ))
                        .await;
                    }
                    Err(e) => {
                        cancelled.store(true, Ordering::SeqCst);
                        last_err = Some(e);
                    }
                }
            }

            if let Some(e) = last_err {
                ctx.mark_failed(e.to_string()).await;
                return Ok(());
            }
        }

        let elapsed = t1.elapsed();
        let min_duration = ctx.config.backend.retry.min_chapter_duration;
        if elapsed < min_duration {
            tokio::time::sleep(min_duration - elapsed).await;
        }

        Ok(())
    }
}

/// Download one page with up to `retry.max_attempts` tries, requesting a
/// fresh CDN assignment before each retry (§4.5 step 5).
#[allow(clippy::too_many_arguments)]
async fn download_one_page(
    ctx: &ActionContext,
    mut assignment: PageAssignment,
    chapter_id: &str,
    light: bool,
    index: usize,
    n_pages: usize,
    width: usize,
    target_dir: &Path,
    cancelled: &AtomicBool,
) -> Result<()> {
    let retry = ctx.config.backend.retry.clone();
    let mut page_name = assignment.pages[index].clone();
    let mut url = format!("{}/{}", assignment.base_url, page_name);

    for attempt in 1..=retry.max_attempts {
        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cdn(CdnError::NetworkAssignmentFailed(
                "chapter download already failed".into(),
            )));
        }

        let started = Instant::now();
        match ctx.cdn.fetch_page(&url).await {
            Ok((bytes, cached)) => {
                let elapsed = started.elapsed();
                let filename = format_page_name(&page_name, index, width);
                tokio::fs::write(target_dir.join(&filename), &bytes).await?;
                let _ = ctx
                    .cdn
                    .report(PageReport {
                        url: url.clone(),
                        success: true,
                        cached,
                        bytes: bytes.len() as u64,
                        elapsed,
                    })
                    .await;
                return Ok(());
            }
            Err(_) => {
                if attempt == retry.max_attempts {
                    return Err(Error::Cdn(CdnError::PageRetriesExhausted {
                        page: page_name,
                        chapter_id: chapter_id.to_string(),
                    }));
                }

                tokio::time::sleep(retry.delay).await;
                if let Ok(fresh) = ctx.cdn.get_network(chapter_id, light).await {
                    if let Some(p) = fresh.pages.get(index) {
                        page_name = p.clone();
                        url = format!("{}/{}", fresh.base_url, page_name);
                    }
                    assignment = fresh;
                }
            }
        }
    }

    let _ = n_pages;
    unreachable!("the loop above always returns by its final iteration")
}

/// `Ch.<chapter>[ (Vol.<volume>)][ - <title, truncated to 64 chars>]`.
fn build_subdir_name(action: &DownloadChapterAction, chapter: &ChapterInfo) -> String {
    let chapter_label = chapter.chapter.clone().unwrap_or_else(|| "?".into());
    let mut name = format!("Ch.{chapter_label}");

    if action.volume_dedupe {
        let volume_label = chapter.volume.clone().unwrap_or_else(|| "?".into());
        name.push_str(&format!(" (Vol.{volume_label})"));
    }

    if action.append_title {
        if let Some(title) = chapter.title.as_deref().filter(|t| !t.is_empty()) {
            let truncated: String = title.chars().take(64).collect();
            name.push_str(&format!(" - {truncated}"));
        }
    }

    name
}

/// Extracts the digit run from the pre-dash prefix of `original` (the CDN's
/// page filename), left-pads it to `width`, and reattaches the extension —
/// guaranteeing natural sort order of output files (§4.5).
fn format_page_name(original: &str, index: usize, width: usize) -> String {
    let (stem, ext) = match original.rsplit_once('.') {
        Some((s, e)) => (s, Some(e)),
        None => (original, None),
    };
    let prefix = stem.split('-').next().unwrap_or(stem);
    let digits: String = prefix.chars().filter(|c| c.is_ascii_digit()).collect();
    let number: usize = digits.parse().unwrap_or(index + 1);
    let padded = format!("{number:0width$}");
    match ext {
        Some(e) => format!("{padded}.{e}"),
        None => padded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_name_extracts_digit_run_and_pads() {
        assert_eq!(format_page_name("3-abcdef.png", 2, 2), "03.png");
        assert_eq!(format_page_name("10-abcdef.jpg", 9, 2), "10.jpg");
    }

    #[test]
    fn page_name_falls_back_to_index_when_no_digits() {
        assert_eq!(format_page_name("cover.png", 0, 2), "01.png");
    }

    #[test]
    fn subdir_name_combines_volume_and_title() {
        let action = DownloadChapterAction {
            chapter_id: "c1".into(),
            data_obj: None,
            light: false,
            subfolder: true,
            append_title: true,
            volume_dedupe: true,
        };
        let chapter = ChapterInfo {
            id: "c1".into(),
            chapter: Some("10".into()),
            volume: Some("2".into()),
            title: Some("A very long chapter title that keeps going past sixty four characters total".into()),
            groups: vec![],
        };
        let name = build_subdir_name(&action, &chapter);
        assert!(name.starts_with("Ch.10 (Vol.2) - "));
        assert!(name.len() <= "Ch.10 (Vol.2) - ".len() + 64);
    }

    #[test]
    fn subdir_name_uses_placeholder_for_missing_fields() {
        let action = DownloadChapterAction {
            chapter_id: "c1".into(),
            data_obj: None,
            light: false,
            subfolder: true,
            append_title: false,
            volume_dedupe: true,
        };
        let chapter = ChapterInfo {
            id: "c1".into(),
            chapter: None,
            volume: None,
            title: None,
            groups: vec![],
        };
        assert_eq!(build_subdir_name(&action, &chapter), "Ch.? (Vol.?)");
    }
}
