use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{app_state::AppState, auth::dtos::ErrorResponse};

/// Proof that the request carried the configured static bearer token.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyAuth;

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidTokenFormat)?;

        if token != state.config.api_key() {
            warn!("Rejected request with an unknown API key");
            return Err(AuthError::InvalidToken);
        }

        Ok(ApiKeyAuth)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidTokenFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidTokenFormat => "Invalid token format",
            AuthError::InvalidToken => "Invalid API key",
        };

        (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::config::Config;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
        routing::get,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn protected_handler(_auth: ApiKeyAuth) -> &'static str {
        "Access granted"
    }

    fn create_test_app() -> Router {
        let config = Config::default().with_api_key("secret-key");
        Router::new()
            .route("/protected", get(protected_handler))
            .with_state(AppState::for_tests(config))
    }

    async fn call(header: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().method("GET").uri("/protected");
        if let Some(value) = header {
            request = request.header(AUTHORIZATION, value);
        }
        let response = create_test_app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let (status, body) = call(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Missing authorization token");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme() {
        let (status, _) = call(Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_bearer_token() {
        let (status, body) = call(Some("Bearer ")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid token format"));
    }

    #[tokio::test]
    async fn test_wrong_key() {
        let (status, body) = call(Some("Bearer not-the-key")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_valid_key() {
        let (status, body) = call(Some("Bearer secret-key")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Access granted");
    }
}
