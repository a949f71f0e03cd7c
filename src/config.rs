//! Configuration for the worker scheduler.
//!
//! Mirrors the JSON-file-plus-environment-override shape described in the
//! specification's external-interfaces section: a base JSON document is
//! loaded, then any `WORKER_`-prefixed environment variable overrides the
//! matching (double-underscore-nested) key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

fn default_temp_path() -> PathBuf {
    PathBuf::from("/tmp/manga-worker")
}

fn default_scheduler_empty_wait() -> Duration {
    Duration::from_millis(250)
}

fn default_task_ttl() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_task_empty_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_catalog_base_url() -> String {
    "https://api.mangadex.org".to_string()
}

fn default_catalog_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cdn_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_task_cache_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_page_retry_attempts() -> u32 {
    5
}

fn default_page_retry_delay() -> Duration {
    Duration::from_millis(1500)
}

fn default_rate_limit_window() -> Duration {
    Duration::from_millis(1500)
}

/// Top-level configuration, composed of the independent sections below via
/// `#[serde(flatten)]` so the on-disk JSON reads as one flat document with
/// nested groups rather than a single monolithic struct.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Background-loop timers.
    #[serde(flatten)]
    pub timers: TimersConfig,

    /// This process's worker (backend) surface.
    #[serde(flatten)]
    pub backend: BackendConfig,

    /// Frontend dispatch configuration (data only; not served by this crate).
    #[serde(default)]
    pub frontend: FrontendConfig,

    /// Admin surface configuration (data only; not served by this crate).
    #[serde(default)]
    pub admin: AdminConfig,

    /// External manga catalog connection settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// External CDN connection settings.
    #[serde(default)]
    pub cdn: CdnConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timers: TimersConfig::default(),
            backend: BackendConfig::default(),
            frontend: FrontendConfig::default(),
            admin: AdminConfig::default(),
            catalog: CatalogConfig::default(),
            cdn: CdnConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, then apply `WORKER_`-prefixed
    /// environment variable overrides on top of it. A double underscore in
    /// the variable name (`WORKER_BACKEND__AUTH_TOKEN`) addresses a nested
    /// field (`backend.auth_token`), the same dotted-path idea the original
    /// deployment's config loader uses for its `additional_configurations`
    /// merge step.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut value = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_json::from_str::<serde_json::Value>(&text)?
            }
            None => serde_json::to_value(Config::default())?,
        };

        for (key, raw) in std::env::vars() {
            let Some(path) = key.strip_prefix("WORKER_") else {
                continue;
            };
            let mut segments: Vec<String> = path.split("__").map(|s| s.to_lowercase()).collect();
            // `timers`/`backend` are `#[serde(flatten)]`ed into the top-level
            // document, so their own fields live at the top level too; strip
            // the leading segment naming them or `set_nested` would create a
            // nested object serde's flatten can't see.
            if segments.first().is_some_and(|s| s == "timers" || s == "backend") {
                segments.remove(0);
            }
            if segments.is_empty() {
                continue;
            }
            set_nested(&mut value, &segments, env_value_to_json(&raw));
        }

        serde_json::from_value(value).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Absolute path to the temp directory task working directories live
    /// under.
    pub fn temp_dir(&self) -> &PathBuf {
        &self.backend.temp_path
    }
}

fn env_value_to_json(raw: &str) -> serde_json::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return serde_json::Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return serde_json::Value::Number(n.into());
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return serde_json::Value::Number(num);
        }
    }
    serde_json::Value::String(raw.to_string())
}

fn set_nested(root: &mut serde_json::Value, segments: &[String], leaf: serde_json::Value) {
    if !root.is_object() {
        *root = serde_json::Value::Object(Default::default());
    }
    let obj = root.as_object_mut().expect("forced to object above");
    match segments {
        [] => {}
        [only] => {
            obj.insert(only.clone(), leaf);
        }
        [first, rest @ ..] => {
            let entry = obj
                .entry(first.clone())
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
            set_nested(entry, rest, leaf);
        }
    }
}

/// Background-loop timing intervals.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TimersConfig {
    /// How long the dispatch loop sleeps when the scheduler has no queued work.
    #[serde(default = "default_scheduler_empty_wait", with = "duration_ms")]
    pub scheduler_empty_wait: Duration,

    /// Maximum age of a task with outstanding actions before cleanup reclaims it.
    #[serde(default = "default_task_ttl", with = "duration_secs")]
    pub task_ttl: Duration,

    /// Maximum age of a task with no actions left before cleanup reclaims it.
    #[serde(default = "default_task_empty_ttl", with = "duration_secs")]
    pub task_empty_ttl: Duration,

    /// Interval between cleanup-loop passes.
    #[serde(default = "default_cleanup_interval", with = "duration_secs")]
    pub cleanup_interval: Duration,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            scheduler_empty_wait: default_scheduler_empty_wait(),
            task_ttl: default_task_ttl(),
            task_empty_ttl: default_task_empty_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// This worker's own HTTP backend surface and admission limits.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BackendConfig {
    /// Whether to mount the worker HTTP surface at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory task working directories and archives are created under.
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,

    /// Bind address for the worker's own HTTP server.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Shared bearer token required on protected routes. `None` disables auth.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// When true, `/queue/back/{id}/data` skips the auth check.
    #[serde(default)]
    pub always_allow_retrieve: bool,

    /// When true, `/queue/back/new` consults admission control before
    /// accepting a task.
    #[serde(default)]
    pub enforce_limits: bool,

    /// Hide the worker routes from the generated OpenAPI document.
    #[serde(default)]
    pub hide_from_openapi: bool,

    /// Resource limits evaluated by admission control.
    #[serde(default)]
    pub limits: WorkerLimits,

    /// Page-fetch retry policy for `DownloadChapter`.
    #[serde(default)]
    pub retry: PageRetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temp_path: default_temp_path(),
            bind_address: default_bind_address(),
            auth_token: None,
            always_allow_retrieve: false,
            enforce_limits: false,
            hide_from_openapi: false,
            limits: WorkerLimits::default(),
            retry: PageRetryConfig::default(),
        }
    }
}

/// Fixed-delay retry policy for per-page CDN downloads (§4.5). Unlike the
/// exponential-backoff-with-jitter retry used elsewhere in this codebase's
/// stack, page retries use a small fixed attempt count and delay, mirroring
/// the upstream rate limit the catalog enforces per chapter.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PageRetryConfig {
    /// Maximum attempts per page before the task is failed.
    #[serde(default = "default_page_retry_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_page_retry_delay", with = "duration_ms")]
    pub delay: Duration,

    /// Minimum wall-clock time a chapter download must take, used to throttle
    /// requests to the catalog on the caller's behalf.
    #[serde(default = "default_rate_limit_window", with = "duration_ms")]
    pub min_chapter_duration: Duration,
}

impl Default for PageRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_page_retry_attempts(),
            delay: default_page_retry_delay(),
            min_chapter_duration: default_rate_limit_window(),
        }
    }
}

/// Admission-control resource limits (§4.9). Every field is optional; an
/// unset limit is never enforced.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct WorkerLimits {
    /// Maximum number of groups the scheduler may hold.
    #[serde(default)]
    pub max_groups: Option<u64>,
    /// Maximum number of groups with outstanding work.
    #[serde(default)]
    pub max_active_groups: Option<u64>,
    /// Maximum number of tasks across all groups.
    #[serde(default)]
    pub max_tasks: Option<u64>,
    /// Maximum number of tasks with outstanding work.
    #[serde(default)]
    pub max_active_tasks: Option<u64>,
    /// Maximum bytes the worker's temp directory may occupy.
    #[serde(default)]
    pub max_worker_space_mb: Option<u64>,
    /// Maximum percentage of total disk the worker's temp directory may occupy.
    #[serde(default)]
    pub max_worker_space_pct: Option<f64>,
    /// Maximum bytes used on the worker's disk overall.
    #[serde(default)]
    pub max_used_space_mb: Option<u64>,
    /// Maximum percentage of total disk used overall.
    #[serde(default)]
    pub max_used_space_pct: Option<f64>,
    /// Minimum free bytes that must remain on the worker's disk.
    #[serde(default)]
    pub min_free_space_mb: Option<u64>,
    /// Minimum free percentage that must remain on the worker's disk.
    #[serde(default)]
    pub min_free_space_pct: Option<f64>,
}

/// Frontend dispatch configuration. Modeled as data only: this crate does
/// not implement the frontend's routing/proxy behavior, but the worker
/// selection contract it relies on (§6) is shaped by these fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct FrontendConfig {
    /// Whether the (external) frontend process is enabled. Informational only.
    #[serde(default)]
    pub enabled: bool,

    /// Known worker backends, keyed by an operator-chosen id.
    #[serde(default)]
    pub backends: HashMap<String, FrontendBackendConfig>,

    /// How long the frontend's task-to-worker cache entries stay valid.
    #[serde(default = "default_task_cache_ttl", with = "duration_secs")]
    pub task_cache_ttl: Duration,
}

/// One worker entry in the frontend's backend pool.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FrontendBackendConfig {
    /// Base URL the frontend uses to reach this worker.
    pub url: String,
    /// URL surfaced to end users (may differ from `url` behind a proxy).
    #[serde(default)]
    pub external_url: Option<String>,
    /// Bearer token the frontend presents to this worker.
    #[serde(default)]
    pub token: Option<String>,
    /// Tie-breaker when multiple workers have equal load; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Per-request timeout when probing or dispatching to this worker.
    #[serde(default = "default_catalog_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Whether the frontend proxies archive bytes through itself.
    #[serde(default)]
    pub proxy_data: bool,
    /// Skip the `/queue/back/ready` probe before dispatching to this worker.
    #[serde(default)]
    pub skip_ready_check: bool,
    /// Exclude this worker from selection entirely.
    #[serde(default)]
    pub maintenance: bool,
}

/// Admin surface configuration. Data only; not served by this crate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct AdminConfig {
    /// Shared bearer token for the admin surface.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Hide the admin routes from the generated OpenAPI document.
    #[serde(default)]
    pub hide_from_openapi: bool,
}

/// Connection settings for the external manga catalog API.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CatalogConfig {
    /// Base URL of the catalog API.
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_catalog_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            request_timeout: default_catalog_timeout(),
        }
    }
}

/// Connection settings for the external page content-delivery network.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CdnConfig {
    /// Per-page request timeout.
    #[serde(default = "default_cdn_timeout", with = "duration_secs")]
    pub page_timeout: Duration,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            page_timeout: default_cdn_timeout(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_value(&cfg).unwrap();
        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.backend.bind_address, cfg.backend.bind_address);
    }

    #[test]
    fn env_override_sets_nested_field() {
        // SAFETY: test runs single-threaded w.r.t. this variable; no other
        // test reads WORKER_BACKEND__ENFORCE_LIMITS.
        unsafe {
            std::env::set_var("WORKER_BACKEND__ENFORCE_LIMITS", "true");
        }
        let cfg = Config::load(None).unwrap();
        assert!(cfg.backend.enforce_limits);
        unsafe {
            std::env::remove_var("WORKER_BACKEND__ENFORCE_LIMITS");
        }
    }

    #[test]
    fn page_retry_defaults_match_spec() {
        let cfg = PageRetryConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.delay, Duration::from_millis(1500));
    }
}
