//! HTTP error response handling for the worker's API.
//!
//! Converts domain errors to HTTP responses with the appropriate status code
//! and a structured JSON error body.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Implement IntoResponse for Error to automatically convert errors to HTTP responses
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Implement IntoResponse for ApiError for explicit error responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Default to 500 if we're directly converting an ApiError
        // (usually errors go through Error::into_response which has the status code)
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[test]
    fn task_not_found_maps_to_404() {
        let error = Error::TaskNotFound("abc".to_string());
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), "task_not_found");
    }

    #[test]
    fn cancelled_maps_to_409() {
        assert_eq!(Error::Cancelled.status_code(), 409);
        assert_eq!(Error::Cancelled.error_code(), "cancelled");
    }

    #[test]
    fn empty_result_maps_to_422() {
        let error = Error::Catalog(CatalogError::EmptyResult);
        assert_eq!(error.status_code(), 422);
    }

    #[test]
    fn unauthorized_maps_to_403() {
        assert_eq!(Error::Unauthorized.status_code(), 403);
    }

    #[tokio::test]
    async fn error_into_response_carries_status_and_body() {
        let error = Error::TaskNotFound("xyz".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();
        assert_eq!(api_error.error.code, "task_not_found");
        assert!(api_error.error.message.contains("xyz"));
    }

    #[tokio::test]
    async fn not_ready_into_response_is_503() {
        let response = Error::NotReady.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn not_retrievable_into_response_is_403() {
        let response = Error::NotRetrievable("abc".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
