//! Authentication middleware for the worker's HTTP surface.
//!
//! Provides optional bearer-token authentication. When
//! `BackendConfig::auth_token` is set, protected requests must carry a
//! matching `Authorization: Bearer <token>` header or receive a 403
//! Forbidden response (`Error::Unauthorized`'s mapping).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::Error;

/// Authentication middleware that checks for a valid bearer token.
///
/// If no token is configured, every request passes through untouched.
pub async fn require_bearer_token(
    State(expected_token): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_token else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        _ => axum::response::IntoResponse::into_response(Error::Unauthorized),
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
    };
    use tower::ServiceExt;

    async fn test_handler() -> impl IntoResponse {
        (StatusCode::OK, "Success")
    }

    fn router(token: Option<String>) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(token, require_bearer_token))
    }

    #[tokio::test]
    async fn no_token_configured_allows_all_requests() {
        let app = router(None);
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_bearer_token_succeeds() {
        let app = router(Some("secret".to_string()));
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_is_forbidden() {
        let app = router(Some("secret".to_string()));
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_header_is_forbidden() {
        let app = router(Some("secret".to_string()));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_bearer_prefix_is_forbidden() {
        let app = router(Some("secret".to_string()));
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
