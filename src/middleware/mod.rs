//! HTTP middleware
//!
//! Request pipeline, outermost first:
//! - observability (request id, HTTP metrics) and client IP injection
//! - bearer authentication (`Identity`)
//! - access-context resolution (`AuthorizationContext`, `DataScope`)
//! - per-route authorization and audit capture

pub mod access_context;
pub mod audit_capture;
pub mod auth;
pub mod authorize;
pub mod client_ip;
pub mod data_scope;
pub mod metrics;
pub mod trace;

pub use access_context::{access_context_middleware, AccessContextState, AuthzDenial};
pub use audit_capture::{audit_capture_middleware, AuditCaptureState, RouteAudit};
pub use auth::{require_auth_middleware, AuthMiddlewareState};
pub use authorize::{authorize_middleware, AuthorizeState, AuthorizedRequest, RouteAuthorization};
pub use client_ip::inject_client_ip;
pub use data_scope::{BranchFilter, DataScope};
pub use metrics::ObservabilityLayer;

use crate::domain::RequestContext;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::{header::USER_AGENT, request::Parts};
use std::collections::HashMap;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request metadata stored on audit records.
pub fn request_context(parts: &Parts) -> RequestContext {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    RequestContext {
        request_id: header(REQUEST_ID_HEADER),
        method: Some(parts.method.to_string()),
        path: Some(parts.uri.path().to_string()),
        ip: client_ip::extract_ip(&parts.headers),
        user_agent: header(USER_AGENT.as_str()),
    }
}

/// Matched route parameters, empty when the route has none.
pub async fn path_params(parts: &mut Parts) -> HashMap<String, String> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        Err(_) => HashMap::new(),
    }
}
