//! Expands a manga-level request into one `DownloadChapter` action per
//! surviving chapter, plus a terminal `ArchiveContents` (§4.4).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{ChapterFilter, ChapterInfo};
use crate::error::{CatalogError, Error, Result};
use crate::worker::action::Action;
use crate::worker::actions::archive_contents::ArchiveContentsAction;
use crate::worker::actions::download_chapter::DownloadChapterAction;
use crate::worker::actions::ActionContext;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AddMangaChaptersAction {
    pub manga_id: String,
    pub light: bool,
    pub language: String,
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

impl AddMangaChaptersAction {
    pub async fn run(&self, ctx: &ActionContext) -> Result<()> {
        ctx.mark_started().await;
        ctx.set_status("Fetching manga metadata").await;

        if let Err(e) = ctx.catalog.get_manga(&self.manga_id).await {
            let message = match e {
                Error::Catalog(CatalogError::NotFound { .. }) => {
                    format!("Manga {} not found", self.manga_id)
                }
                other => format!("Failed to fetch manga metadata: {other}"),
            };
            ctx.mark_failed(message).await;
            return Ok(());
        }

        ctx.set_status("Fetching chapter list").await;
        let filter = ChapterFilter::for_language(self.language.clone());
        let mut chapters = match ctx.catalog.get_chapters(&self.manga_id, &filter).await {
            Ok(c) => c,
            Err(e) => {
                ctx.mark_failed(format!("Failed to fetch chapter list: {e}"))
                    .await;
                return Ok(());
            }
        };

        if !self.preferred_groups.is_empty() {
            chapters =
                select_preferred_groups(chapters, &self.preferred_groups, self.groups_substitute);
        }

        chapters.retain(|c| within_range(c, self.start, self.end));

        let (deduped, volume_dedupe) = dedup_chapters(chapters);

        if deduped.is_empty() {
            ctx.mark_failed("No chapters matched the requested filters")
                .await;
            return Ok(());
        }

        let mut sorted = deduped;
        sorted.sort_by(|a, b| {
            sort_key(a)
                .partial_cmp(&sort_key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for chapter in &sorted {
            ctx.append_action(Action::DownloadChapter(DownloadChapterAction {
                chapter_id: chapter.id.clone(),
                data_obj: Some(chapter.clone()),
                light: self.light,
                subfolder: true,
                append_title: self.append_titles,
                volume_dedupe,
            }))
            .await;
        }
        ctx.append_action(Action::ArchiveContents(ArchiveContentsAction))
            .await;

        ctx.set_status(format!("Expanded into {} chapters", sorted.len()))
            .await;
        Ok(())
    }
}

/// Grouping/dedup key: numeric chapter number when the label parses
/// cleanly, otherwise the raw label (or "0" when there is no label at all).
/// Preserved verbatim rather than normalized, per the documented open
/// question about "10.5" vs "10.50" colliding or not depending on source
/// string representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum DedupKey {
    Numeric(u64),
    Label(String),
}

fn numeric_or_label_key(chapter: &ChapterInfo) -> DedupKey {
    match chapter.chapter_as_f64() {
        Some(f) => DedupKey::Numeric(f.to_bits()),
        None => DedupKey::Label(chapter.chapter.clone().unwrap_or_else(|| "0".into())),
    }
}

fn bucket_key(chapter: &ChapterInfo) -> (Option<String>, DedupKey) {
    (chapter.volume.clone(), numeric_or_label_key(chapter))
}

fn within_range(chapter: &ChapterInfo, start: Option<f64>, end: Option<f64>) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }
    match chapter.chapter_as_f64() {
        Some(n) => {
            if let Some(s) = start {
                if n < s {
                    return false;
                }
            }
            if let Some(e) = end {
                if n > e {
                    return false;
                }
            }
            true
        }
        None => false,
    }
}

/// Groups chapters by `(volume, chapter-number-or-label)`, keeping within
/// each bucket the first chapter whose groups intersect `preferred` —
/// priority follows `preferred`'s order, not the bucket's iteration order.
/// Buckets with no match fall back to an arbitrary member when `substitute`
/// is set, else are dropped entirely (§4.4 step 3).
fn select_preferred_groups(
    chapters: Vec<ChapterInfo>,
    preferred: &[String],
    substitute: bool,
) -> Vec<ChapterInfo> {
    let mut grouped: HashMap<(Option<String>, DedupKey), Vec<ChapterInfo>> = HashMap::new();
    let mut order: Vec<(Option<String>, DedupKey)> = Vec::new();

    for c in chapters {
        let key = bucket_key(&c);
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(c);
    }

    let mut result = Vec::new();
    for key in order {
        let bucket = grouped.remove(&key).unwrap_or_default();
        let picked = preferred
            .iter()
            .find_map(|g| bucket.iter().find(|c| c.groups.contains(g)).cloned());

        match picked.or_else(|| substitute.then(|| bucket.into_iter().next()).flatten()) {
            Some(c) => result.push(c),
            None => continue,
        }
    }
    result
}

/// Dedups by `bucket_key`, keeping the first-seen chapter per key. Returns
/// whether any surviving or dropped chapter had no chapter label at all
/// (`chapter.chapter.is_none()`, not merely unparseable as a float) *and*
/// more than one bucket survived — the signal that downstream
/// `DownloadChapter` actions should embed the volume in their subfolder name
/// to disambiguate otherwise-identical labels (§4.4 step 5).
fn dedup_chapters(chapters: Vec<ChapterInfo>) -> (Vec<ChapterInfo>, bool) {
    let mut seen: HashSet<(Option<String>, DedupKey)> = HashSet::new();
    let mut result = Vec::new();
    let mut any_unnumbered = false;

    for c in chapters {
        if c.chapter.is_none() {
            any_unnumbered = true;
        }
        let key = bucket_key(&c);
        if seen.insert(key) {
            result.push(c);
        }
    }

    let multiple_buckets = result.len() > 1;
    (result, any_unnumbered && multiple_buckets)
}

fn sort_key(chapter: &ChapterInfo) -> f64 {
    chapter.chapter_as_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, chapter: Option<&str>, volume: Option<&str>, groups: &[&str]) -> ChapterInfo {
        ChapterInfo {
            id: id.into(),
            chapter: chapter.map(String::from),
            volume: volume.map(String::from),
            title: None,
            groups: groups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn within_range_drops_below_start_and_above_end() {
        let c = chapter("1", Some("5"), None, &[]);
        assert!(!within_range(&c, Some(6.0), None));
        assert!(!within_range(&c, None, Some(4.0)));
        assert!(within_range(&c, Some(1.0), Some(10.0)));
    }

    #[test]
    fn within_range_drops_non_numeric_when_range_given() {
        let c = chapter("1", Some("Extra"), None, &[]);
        assert!(!within_range(&c, Some(1.0), None));
        assert!(within_range(&c, None, None));
    }

    #[test]
    fn dedup_keeps_first_seen_per_bucket() {
        let chapters = vec![
            chapter("1", Some("10"), Some("2"), &[]),
            chapter("2", Some("10"), Some("2"), &[]),
            chapter("3", Some("11"), Some("2"), &[]),
        ];
        let (deduped, _) = dedup_chapters(chapters);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "1");
    }

    #[test]
    fn dedup_flags_volume_dedupe_when_unnumbered_and_multiple_buckets() {
        let chapters = vec![
            chapter("1", None, Some("1"), &[]),
            chapter("2", Some("2"), Some("2"), &[]),
        ];
        let (_, volume_dedupe) = dedup_chapters(chapters);
        assert!(volume_dedupe);
    }

    #[test]
    fn dedup_does_not_flag_volume_dedupe_for_non_numeric_but_present_label() {
        let chapters = vec![
            chapter("1", Some("Extra"), Some("1"), &[]),
            chapter("2", Some("5"), Some("1"), &[]),
        ];
        let (_, volume_dedupe) = dedup_chapters(chapters);
        assert!(!volume_dedupe);
    }

    #[test]
    fn dedup_does_not_flag_volume_dedupe_for_single_bucket() {
        let chapters = vec![chapter("1", None, Some("1"), &[])];
        let (_, volume_dedupe) = dedup_chapters(chapters);
        assert!(!volume_dedupe);
    }

    #[test]
    fn preferred_groups_picks_by_preference_order_not_bucket_order() {
        let chapters = vec![
            chapter("1", Some("1"), None, &["GroupB"]),
            chapter("2", Some("1"), None, &["GroupA"]),
        ];
        let preferred = vec!["GroupA".to_string(), "GroupB".to_string()];
        let picked = select_preferred_groups(chapters, &preferred, false);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "2");
    }

    #[test]
    fn preferred_groups_drops_bucket_without_substitute() {
        let chapters = vec![chapter("1", Some("1"), None, &["Other"])];
        let preferred = vec!["GroupA".to_string()];
        let picked = select_preferred_groups(chapters, &preferred, false);
        assert!(picked.is_empty());
    }

    #[test]
    fn preferred_groups_substitutes_when_allowed() {
        let chapters = vec![chapter("1", Some("1"), None, &["Other"])];
        let preferred = vec!["GroupA".to_string()];
        let picked = select_preferred_groups(chapters, &preferred, true);
        assert_eq!(picked.len(), 1);
    }
}
