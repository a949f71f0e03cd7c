//! Abstraction over the external manga catalog metadata API.
//!
//! Mirrors the provider-trait pattern this codebase uses to isolate its
//! network dependency (article fetching) behind a small async trait, so
//! `AddMangaChapters`/`DownloadChapter` can be tested against a fake
//! implementation instead of live HTTP.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CatalogError, Error, Result};

/// Manga-level metadata returned by the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MangaInfo {
    /// Catalog id of the manga.
    pub id: String,
    /// Display title.
    pub title: String,
}

/// One chapter's metadata as returned by the catalog's chapter listing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct ChapterInfo {
    /// Catalog id of the chapter.
    pub id: String,
    /// Raw chapter label, e.g. "10.5"; `None` means the chapter is unnumbered (an "oneshot").
    pub chapter: Option<String>,
    /// Raw volume label, e.g. "3"; `None` means no volume grouping.
    pub volume: Option<String>,
    /// Chapter title, if any.
    pub title: Option<String>,
    /// Translator groups credited for this chapter, in no particular order.
    pub groups: Vec<String>,
}

impl ChapterInfo {
    /// Parse [`Self::chapter`] as a float, when it parses cleanly.
    pub fn chapter_as_f64(&self) -> Option<f64> {
        self.chapter.as_deref().and_then(|s| s.parse::<f64>().ok())
    }
}

/// Filters applied when listing a manga's chapters (§4.4 step 2).
#[derive(Clone, Debug, Default)]
pub struct ChapterFilter {
    /// BCP-47-ish language tag, e.g. "en".
    pub translated_language: String,
    /// Content ratings to include.
    pub content_ratings: Vec<String>,
}

impl ChapterFilter {
    /// The filter used by `AddMangaChapters`: every content rating, a single
    /// requested language, and server-side exclusion of empty/future/external
    /// chapters (handled by the catalog, not re-checked here).
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            translated_language: language.into(),
            content_ratings: vec![
                "safe".into(),
                "suggestive".into(),
                "erotica".into(),
                "pornographic".into(),
            ],
        }
    }
}

/// Abstraction over manga catalog lookups, enabling testability without a
/// live network dependency.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch manga-level metadata.
    async fn get_manga(&self, manga_id: &str) -> Result<MangaInfo>;

    /// Fetch the full chapter list for a manga matching `filter`.
    async fn get_chapters(
        &self,
        manga_id: &str,
        filter: &ChapterFilter,
    ) -> Result<Vec<ChapterInfo>>;

    /// Fetch a single chapter's metadata directly.
    async fn get_chapter(&self, chapter_id: &str) -> Result<ChapterInfo>;
}

/// Production [`CatalogClient`] backed by `reqwest`.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpCatalogClient {
    /// Build a client against `base_url`, applying `timeout` to every request.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_manga(&self, manga_id: &str) -> Result<MangaInfo> {
        let url = format!("{}/manga/{}", self.base_url, manga_id);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Catalog(CatalogError::Timeout)
                } else {
                    Error::Network(e)
                }
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Catalog(CatalogError::NotFound {
                kind: "manga".into(),
                id: manga_id.into(),
            }));
        }
        if !resp.status().is_success() {
            return Err(Error::Catalog(CatalogError::ApiError(format!(
                "unexpected status {}",
                resp.status()
            ))));
        }

        resp.json::<MangaInfo>().await.map_err(Error::Network)
    }

    async fn get_chapters(
        &self,
        manga_id: &str,
        filter: &ChapterFilter,
    ) -> Result<Vec<ChapterInfo>> {
        let url = format!("{}/manga/{}/feed", self.base_url, manga_id);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .query(&[
                ("translatedLanguage[]", filter.translated_language.as_str()),
                ("includeEmptyPages", "0"),
                ("includeFuturePublishAt", "0"),
                ("includeExternalUrl", "0"),
            ])
            .query(
                &filter
                    .content_ratings
                    .iter()
                    .map(|r| ("contentRating[]", r.as_str()))
                    .collect::<Vec<_>>(),
            )
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Catalog(CatalogError::Timeout)
                } else {
                    Error::Network(e)
                }
            })?;

        if !resp.status().is_success() {
            return Err(Error::Catalog(CatalogError::ApiError(format!(
                "unexpected status {}",
                resp.status()
            ))));
        }

        resp.json::<Vec<ChapterInfo>>().await.map_err(Error::Network)
    }

    async fn get_chapter(&self, chapter_id: &str) -> Result<ChapterInfo> {
        let url = format!("{}/chapter/{}", self.base_url, chapter_id);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Catalog(CatalogError::Timeout)
                } else {
                    Error::Network(e)
                }
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Catalog(CatalogError::NotFound {
                kind: "chapter".into(),
                id: chapter_id.into(),
            }));
        }
        if !resp.status().is_success() {
            return Err(Error::Catalog(CatalogError::ApiError(format!(
                "unexpected status {}",
                resp.status()
            ))));
        }

        resp.json::<ChapterInfo>().await.map_err(Error::Network)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_as_f64_parses_numeric_labels() {
        let c = ChapterInfo {
            id: "1".into(),
            chapter: Some("10.5".into()),
            volume: None,
            title: None,
            groups: vec![],
        };
        assert_eq!(c.chapter_as_f64(), Some(10.5));
    }

    #[test]
    fn chapter_as_f64_is_none_for_non_numeric_labels() {
        let c = ChapterInfo {
            id: "1".into(),
            chapter: Some("Extra".into()),
            volume: None,
            title: None,
            groups: vec![],
        };
        assert_eq!(c.chapter_as_f64(), None);
    }
}
