//! Bearer token authentication.
//!
//! Validates the access token and attaches the decoded [`Identity`] to the
//! request. Failures here are authentication failures: always 401 and never
//! recorded as authorization decisions.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::jwt::JwtManager;

pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
pub const AUTH_INVALID_TOKEN: &str = "AUTH_INVALID_TOKEN";

/// Shared state for authentication middleware
#[derive(Clone)]
pub struct AuthMiddlewareState {
    jwt_manager: JwtManager,
}

impl AuthMiddlewareState {
    pub fn new(jwt_manager: JwtManager) -> Self {
        Self { jwt_manager }
    }
}

pub async fn require_auth_middleware(
    State(auth_state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = match request.headers().get(AUTHORIZATION) {
        Some(header) => header,
        None => {
            return unauthorized_response(AUTH_REQUIRED, "Missing authorization token");
        }
    };

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => {
            return unauthorized_response(
                AUTH_INVALID_TOKEN,
                "Invalid authorization header encoding",
            );
        }
    };

    let token = match auth_str.strip_prefix("Bearer ") {
        Some(t) => t.trim(),
        None => {
            return unauthorized_response(
                AUTH_INVALID_TOKEN,
                "Authorization header must use Bearer scheme",
            );
        }
    };

    let identity = match auth_state
        .jwt_manager
        .verify_access_token(token)
        .and_then(|claims| claims.into_identity())
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected access token");
            return unauthorized_response(AUTH_INVALID_TOKEN, "Invalid or expired token");
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// 401 with the same `{success, code, message}` shape as authorization denials
pub fn unauthorized_response(code: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "code": code,
            "message": message,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use crate::config::JwtConfig;
    use crate::domain::{Identity, StringUuid};
    use crate::policy::Role;

    async fn whoami(Extension(identity): Extension<Identity>) -> String {
        identity.user_id.to_string()
    }

    fn create_test_jwt_manager() -> JwtManager {
        JwtManager::new(JwtConfig {
            secret: "test-secret-key-for-jwt-signing-must-be-long".to_string(),
            issuer: "retail-platform".to_string(),
            audience: "retail-api".to_string(),
            access_token_ttl_secs: 3600,
        })
    }

    fn app(jwt_manager: JwtManager) -> Router {
        Router::new()
            .route("/protected", get(whoami))
            .layer(axum::middleware::from_fn_with_state(
                AuthMiddlewareState::new(jwt_manager),
                require_auth_middleware,
            ))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_auth_header_returns_401() {
        let request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_jwt_manager()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], AUTH_REQUIRED);
    }

    #[tokio::test]
    async fn test_invalid_bearer_scheme_returns_401() {
        let request = Request::builder()
            .uri("/protected")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_jwt_manager()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], AUTH_INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_invalid_token_returns_401() {
        let request = Request::builder()
            .uri("/protected")
            .header("Authorization", "Bearer invalid.token.here")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_jwt_manager()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], AUTH_INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let jwt_manager = create_test_jwt_manager();
        let identity = Identity {
            user_id: StringUuid::new_v4(),
            role: Some(Role::Customer),
            system_roles: vec![],
            task_roles: vec![],
            branch_assignments: vec![],
            access_review_required: false,
        };
        let token = jwt_manager.create_access_token(&identity).unwrap();

        let request = Request::builder()
            .uri("/protected")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = app(jwt_manager).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), identity.user_id.to_string());
    }
}
