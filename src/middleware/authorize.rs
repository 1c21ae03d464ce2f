//! Per-route authorization.
//!
//! Each protected route declares what it does through [`RouteAuthorization`]
//! and is wrapped with [`authorize_middleware`] via `route_layer`. The
//! middleware resolves action, scope and resource, asks the policy engine,
//! records the decision and either denies with 403 or stamps an
//! [`AuthorizedRequest`] on the request.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::access_context::AuthzDenial;
use super::auth::{unauthorized_response, AUTH_REQUIRED};
use crate::domain::{AuthorizationContext, AuthzAuditLogEntry, AuthzDecision, ScopeMode, StringUuid};
use crate::error::Result;
use crate::policy::{evaluate_policy, PolicyRequest, ResourceRef};
use crate::service::AuthzAuditService;
use crate::telemetry::metrics as telemetry_metrics;

pub type ActionResolverFn = Arc<dyn Fn(&Parts) -> Option<String> + Send + Sync>;

/// Where the action identifier comes from.
#[derive(Clone)]
pub enum ActionSource {
    Literal(&'static str),
    Resolver(ActionResolverFn),
}

impl ActionSource {
    fn resolve(&self, parts: &Parts) -> Option<String> {
        match self {
            ActionSource::Literal(action) => Some((*action).to_string()),
            ActionSource::Resolver(resolve) => resolve(parts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSource {
    Fixed(ScopeMode),
    /// Use the scope the access context resolved to.
    FromContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequireActiveBranch {
    Never,
    Always,
    ForModes(Vec<ScopeMode>),
}

impl RequireActiveBranch {
    fn applies(&self, mode: ScopeMode) -> bool {
        match self {
            RequireActiveBranch::Never => false,
            RequireActiveBranch::Always => true,
            RequireActiveBranch::ForModes(modes) => modes.contains(&mode),
        }
    }
}

/// What a resource resolver gets to look at.
pub struct RouteRequest<'a> {
    pub parts: &'a Parts,
    pub path_params: &'a HashMap<String, String>,
    pub context: &'a AuthorizationContext,
}

impl RouteRequest<'_> {
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(|s| s.as_str())
    }
}

/// Looks up the branch/assignee of the targeted resource.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, request: &RouteRequest<'_>) -> Result<Option<ResourceRef>>;
}

/// Authorization declaration for one route.
#[derive(Clone)]
pub struct RouteAuthorization {
    action: ActionSource,
    scope: ScopeSource,
    require_active_branch: RequireActiveBranch,
    resource: Option<Arc<dyn ResourceResolver>>,
    resource_type: Option<&'static str>,
    audit: bool,
}

impl RouteAuthorization {
    pub fn action(action: &'static str) -> Self {
        Self::with_source(ActionSource::Literal(action))
    }

    pub fn resolve_action<F>(resolve: F) -> Self
    where
        F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
    {
        Self::with_source(ActionSource::Resolver(Arc::new(resolve)))
    }

    fn with_source(action: ActionSource) -> Self {
        Self {
            action,
            scope: ScopeSource::FromContext,
            require_active_branch: RequireActiveBranch::Never,
            resource: None,
            resource_type: None,
            audit: true,
        }
    }

    pub fn scope(mut self, mode: ScopeMode) -> Self {
        self.scope = ScopeSource::Fixed(mode);
        self
    }

    pub fn require_active_branch(mut self) -> Self {
        self.require_active_branch = RequireActiveBranch::Always;
        self
    }

    pub fn require_active_branch_for(mut self, modes: Vec<ScopeMode>) -> Self {
        self.require_active_branch = RequireActiveBranch::ForModes(modes);
        self
    }

    pub fn resource<R: ResourceResolver + 'static>(mut self, resolver: R) -> Self {
        self.resource = Some(Arc::new(resolver));
        self
    }

    pub fn resource_type(mut self, resource_type: &'static str) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Record ALLOW decisions for this route (DENY is always recorded).
    pub fn audit(mut self, enabled: bool) -> Self {
        self.audit = enabled;
        self
    }
}

/// Stamped on the request after an ALLOW.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub action: String,
    pub scope_mode: ScopeMode,
    pub resource: Option<ResourceRef>,
}

/// Shared state for authorization middleware
#[derive(Clone)]
pub struct AuthorizeState {
    route: Arc<RouteAuthorization>,
    authz_audit: AuthzAuditService,
}

impl AuthorizeState {
    pub fn new(route: RouteAuthorization, authz_audit: AuthzAuditService) -> Self {
        Self {
            route: Arc::new(route),
            authz_audit,
        }
    }
}

pub async fn authorize_middleware(
    State(state): State<AuthorizeState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(context) = request.extensions().get::<AuthorizationContext>().cloned() else {
        return unauthorized_response(AUTH_REQUIRED, "Authorization context missing");
    };
    let route = &state.route;

    let (mut parts, body) = request.into_parts();
    let path_params = super::path_params(&mut parts).await;

    let action = route.action.resolve(&parts);
    let mode = match route.scope {
        ScopeSource::Fixed(mode) => mode,
        ScopeSource::FromContext => context.scope_mode,
    };
    let require_active_branch = route.require_active_branch.applies(mode);

    let resource = match &route.resource {
        Some(resolver) => {
            let view = RouteRequest {
                parts: &parts,
                path_params: &path_params,
                context: &context,
            };
            match resolver.resolve(&view).await {
                Ok(resource) => resource,
                Err(e) => return e.into_response(),
            }
        }
        None => None,
    };
    let resource = resource.map(|mut r| {
        if r.resource_type.is_none() {
            r.resource_type = route.resource_type.map(str::to_string);
        }
        r
    });

    let decision = evaluate_policy(&PolicyRequest {
        action: action.as_deref(),
        context: Some(&context),
        mode,
        require_active_branch,
        resource: resource.as_ref(),
    });

    let entry = AuthzAuditLogEntry {
        id: StringUuid::new_v4(),
        actor_id: Some(context.actor_id),
        action: action.clone(),
        decision: if decision.allowed {
            AuthzDecision::Allow
        } else {
            AuthzDecision::Deny
        },
        reason_code: decision.code.as_str().to_string(),
        scope_mode: Some(mode),
        active_branch_id: context.active_branch_id,
        resource_type: resource
            .as_ref()
            .and_then(|r| r.resource_type.clone())
            .or_else(|| route.resource_type.map(str::to_string)),
        resource_id: resource.as_ref().and_then(|r| r.resource_id.clone()),
        request_context: Some(super::request_context(&parts)),
        created_at: Utc::now(),
    };

    if !decision.allowed {
        tracing::info!(
            actor_id = %context.actor_id,
            action = ?action,
            scope_mode = mode.as_str(),
            code = decision.code.as_str(),
            "Authorization denied"
        );
        state.authz_audit.record(entry).await;
        return AuthzDenial::from(decision).into_response();
    }

    if route.audit {
        state.authz_audit.record(entry).await;
    } else {
        telemetry_metrics::record_authz_decision(
            AuthzDecision::Allow.as_str(),
            decision.code.as_str(),
        );
    }

    parts.extensions.insert(AuthorizedRequest {
        action: action.unwrap_or_default(),
        scope_mode: mode,
        resource,
    });
    next.run(Request::from_parts(parts, body)).await
}
