//! Abstraction over the external page content-delivery network.

use std::time::Duration;

use crate::error::{Error, Result};

/// A CDN page assignment for one chapter: a base URL plus the ordered list of
/// page filenames to append to it, and whether the list is the "redux"
/// (reduced-resolution) variant.
#[derive(Clone, Debug)]
pub struct PageAssignment {
    /// Base URL pages are joined under, e.g. `https://cdn.example/data/<hash>`.
    pub base_url: String,
    /// Ordered page filenames as returned by the CDN (e.g. "x1-abc123.png").
    pub pages: Vec<String>,
}

/// Outcome of one page download attempt, reported back to the CDN so it can
/// track node health (§4.5 step 6).
#[derive(Clone, Debug)]
pub struct PageReport {
    /// The page URL that was fetched.
    pub url: String,
    /// Whether the fetch ultimately succeeded.
    pub success: bool,
    /// Whether the response carried `x-cache: HIT`.
    pub cached: bool,
    /// Response body size in bytes.
    pub bytes: u64,
    /// Wall-clock time the request took.
    pub elapsed: Duration,
}

/// Abstraction over CDN network assignment, page fetch, and reporting,
/// enabling testability without a live network dependency.
#[async_trait::async_trait]
pub trait CdnClient: Send + Sync {
    /// Request a (possibly fresh, on retry) page list for a chapter.
    async fn get_network(&self, chapter_id: &str, light: bool) -> Result<PageAssignment>;

    /// Download a single page's bytes.
    async fn fetch_page(&self, url: &str) -> Result<(Vec<u8>, bool)>;

    /// Report the outcome of a page download. Errors are swallowed by
    /// callers, matching the original source's `except APIError: pass`.
    async fn report(&self, report: PageReport) -> Result<()>;
}

/// Production [`CdnClient`] backed by `reqwest`.
pub struct HttpCdnClient {
    http: reqwest::Client,
    catalog_base_url: String,
    page_timeout: Duration,
}

impl HttpCdnClient {
    /// Build a client that requests network assignments from `catalog_base_url`
    /// and applies `page_timeout` to every page fetch.
    pub fn new(catalog_base_url: impl Into<String>, page_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            catalog_base_url: catalog_base_url.into(),
            page_timeout,
        }
    }
}

#[async_trait::async_trait]
impl CdnClient for HttpCdnClient {
    async fn get_network(&self, chapter_id: &str, light: bool) -> Result<PageAssignment> {
        let url = format!(
            "{}/at-home/server/{}",
            self.catalog_base_url, chapter_id
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(Error::Network)?;

        if !resp.status().is_success() {
            return Err(Error::Cdn(crate::error::CdnError::NetworkAssignmentFailed(
                format!("status {}", resp.status()),
            )));
        }

        #[derive(serde::Deserialize)]
        struct AtHomeResponse {
            #[serde(rename = "baseUrl")]
            base_url: String,
            chapter: AtHomeChapter,
        }
        #[derive(serde::Deserialize)]
        struct AtHomeChapter {
            data: Vec<String>,
            #[serde(rename = "dataSaver")]
            data_saver: Vec<String>,
            hash: String,
        }

        let body: AtHomeResponse = resp.json().await.map_err(Error::Network)?;
        let (kind, pages) = if light {
            ("data-saver", body.chapter.data_saver)
        } else {
            ("data", body.chapter.data)
        };

        Ok(PageAssignment {
            base_url: format!("{}/{}/{}", body.base_url, kind, body.chapter.hash),
            pages,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<(Vec<u8>, bool)> {
        let resp = self
            .http
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(Error::Network)?;

        let cached = resp
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("HIT"))
            .unwrap_or(false);

        let bytes = resp.bytes().await.map_err(Error::Network)?;
        Ok((bytes.to_vec(), cached))
    }

    async fn report(&self, report: PageReport) -> Result<()> {
        let url = format!("{}/report", self.catalog_base_url);
        let _ = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "url": report.url,
                "success": report.success,
                "cached": report.cached,
                "bytes": report.bytes,
                "duration": report.elapsed.as_millis(),
            }))
            .send()
            .await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory [`CdnClient`] for unit tests. `fail_until_attempt` lets tests
    /// model the "first N attempts fail" retry scenarios from the spec.
    pub struct FakeCdnClient {
        pub pages: HashMap<String, Vec<u8>>,
        pub fail_until_attempt: Mutex<HashMap<String, u32>>,
        pub attempts: Mutex<HashMap<String, u32>>,
    }

    impl FakeCdnClient {
        pub fn new(pages: Vec<(&str, &[u8])>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                fail_until_attempt: Mutex::new(HashMap::new()),
                attempts: Mutex::new(HashMap::new()),
            }
        }

        pub fn fail_page_until(mut self, page: &str, attempt: u32) -> Self {
            self.fail_until_attempt
                .get_mut()
                .unwrap()
                .insert(page.to_string(), attempt);
            self
        }
    }

    #[async_trait::async_trait]
    impl CdnClient for FakeCdnClient {
        async fn get_network(&self, _chapter_id: &str, _light: bool) -> Result<PageAssignment> {
            let mut pages: Vec<String> = self.pages.keys().cloned().collect();
            pages.sort();
            Ok(PageAssignment {
                base_url: "fake://cdn".into(),
                pages,
            })
        }

        async fn fetch_page(&self, url: &str) -> Result<(Vec<u8>, bool)> {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            let this_attempt = *count;
            drop(attempts);

            if let Some(&threshold) = self.fail_until_attempt.lock().unwrap().get(url) {
                if this_attempt < threshold {
                    return Err(Error::Cdn(crate::error::CdnError::NetworkAssignmentFailed(
                        "simulated transport failure".into(),
                    )));
                }
            }

            self.pages
                .get(url)
                .cloned()
                .map(|b| (b, false))
                .ok_or_else(|| {
                    Error::Cdn(crate::error::CdnError::NetworkAssignmentFailed(
                        "no such page".into(),
                    ))
                })
        }

        async fn report(&self, _report: PageReport) -> Result<()> {
            Ok(())
        }
    }
}
