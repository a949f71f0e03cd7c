//! Error types for the worker scheduler.
//!
//! This module provides the crate-wide error type plus HTTP status/error-code
//! mapping so the worker's own HTTP surface can translate domain errors into
//! structured JSON responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type used throughout the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue.
        message: String,
        /// The configuration key that caused the error (e.g. "backend.temp_path").
        key: Option<String>,
    },

    /// Catalog metadata lookup failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// CDN page fetch failed.
    #[error("CDN error: {0}")]
    Cdn(#[from] CdnError),

    /// Archive packaging failed.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Worker is over its configured resource limits.
    #[error("worker not ready: resource limits exceeded")]
    NotReady,

    /// Task exists but is not in a retrievable state (not completed, or failed).
    #[error("task {0} is not ready for retrieval")]
    NotRetrievable(String),

    /// Task's terminal action does not produce a retrievable result.
    #[error("task {0} has no retrievable result")]
    NoResult(String),

    /// Task was cancelled by an administrator.
    #[error("task execution cancelled")]
    Cancelled,

    /// Network/transport error contacting an external service.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid bearer token on a protected request.
    #[error("unauthorized")]
    Unauthorized,

    /// Request named an unknown ingress task type.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// Catch-all for unexpected failures escaping an action; the dispatch
    /// loop converts this into a failed-task status rather than propagating.
    #[error("{0}")]
    Other(String),
}

/// Errors from the external manga catalog metadata service.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested manga or chapter does not exist.
    #[error("no such {kind}: {id}")]
    NotFound {
        /// "manga" or "chapter".
        kind: String,
        /// The id that was looked up.
        id: String,
    },

    /// The catalog API returned an error response.
    #[error("catalog API error: {0}")]
    ApiError(String),

    /// The request to the catalog timed out.
    #[error("catalog request timed out")]
    Timeout,

    /// After filtering, no chapters remained.
    #[error("no chapters matched the requested filters")]
    EmptyResult,
}

/// Errors from the per-chapter content-delivery network.
#[derive(Debug, Error)]
pub enum CdnError {
    /// Obtaining a CDN node/page-list assignment failed.
    #[error("CDN network assignment failed: {0}")]
    NetworkAssignmentFailed(String),

    /// A page failed to download after exhausting retries.
    #[error("MD Node Error when downloading page {page} from chapter {chapter_id}")]
    PageRetriesExhausted {
        /// The page filename that failed.
        page: String,
        /// The chapter id being downloaded.
        chapter_id: String,
    },
}

/// Errors from ZIP archive packaging.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Underlying zip-crate error.
    #[error("zip error: {0}")]
    Zip(String),

    /// The task's working directory could not be walked.
    #[error("failed to walk working directory {path}: {reason}")]
    WalkFailed {
        /// The directory that could not be walked.
        path: String,
        /// Human-readable cause.
        reason: String,
    },
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        ArchiveError::Zip(e.to_string())
    }
}

/// Structured API error body returned by the worker HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error payload.
    pub error: ErrorDetail,
}

/// Machine-readable error details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code, stable across releases.
    pub code: String,

    /// Human-readable error message suitable for display.
    pub message: String,
}

impl ApiError {
    /// Create a new API error with code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Convert domain errors to HTTP status codes for API responses.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error.
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code.
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::UnknownTaskType(_) => 400,

            Error::TaskNotFound(_) => 404,
            Error::Catalog(CatalogError::NotFound { .. }) => 404,

            Error::NotRetrievable(_) => 403,
            Error::NoResult(_) => 403,

            Error::Catalog(CatalogError::EmptyResult) => 422,

            Error::Unauthorized => 403,

            Error::NotReady => 503,
            Error::Catalog(CatalogError::Timeout) => 503,
            Error::Catalog(CatalogError::ApiError(_)) => 503,
            Error::Cdn(_) => 503,

            Error::Cancelled => 409,

            Error::Archive(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            Error::Network(_) => 502,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Catalog(e) => match e {
                CatalogError::NotFound { .. } => "not_found",
                CatalogError::ApiError(_) => "catalog_api_error",
                CatalogError::Timeout => "catalog_timeout",
                CatalogError::EmptyResult => "empty_result",
            },
            Error::Cdn(_) => "cdn_error",
            Error::Archive(_) => "archive_error",
            Error::Io(_) => "io_error",
            Error::TaskNotFound(_) => "task_not_found",
            Error::NotReady => "not_ready",
            Error::NotRetrievable(_) => "not_retrievable",
            Error::NoResult(_) => "no_result",
            Error::Cancelled => "cancelled",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Unauthorized => "unauthorized",
            Error::UnknownTaskType(_) => "unknown_task_type",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::new(error.error_code().to_string(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = Error::Catalog(CatalogError::NotFound {
            kind: "manga".into(),
            id: "abc".into(),
        });
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), "not_found");
    }

    #[test]
    fn empty_result_maps_to_422() {
        let err = Error::Catalog(CatalogError::EmptyResult);
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn not_ready_maps_to_503() {
        assert_eq!(Error::NotReady.status_code(), 503);
    }

    #[test]
    fn unauthorized_maps_to_403() {
        assert_eq!(Error::Unauthorized.status_code(), 403);
    }

    #[test]
    fn retry_exhausted_message_matches_original_wording() {
        let err = CdnError::PageRetriesExhausted {
            page: "001.png".into(),
            chapter_id: "chap-1".into(),
        };
        assert!(err.to_string().contains("MD Node Error"));
    }
}
