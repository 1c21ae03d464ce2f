//! Access-context resolution.
//!
//! Runs once per authenticated request: turns the [`Identity`] and the
//! branch-selection headers into an [`AuthorizationContext`], or denies.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use super::auth::{unauthorized_response, AUTH_REQUIRED};
use super::data_scope::{DataScope, DATA_SCOPE};
use crate::domain::{
    ActorKind, AuthorizationContext, AuthzAuditLogEntry, AuthzDecision, BranchResolution,
    ContextMode, Identity, ScopeMode, StringUuid,
};
use crate::policy::{AuthzCode, PolicyDecision};
use crate::service::AuthzAuditService;

/// Selects the active branch. Rejected for staff with a fixed branch.
pub const BRANCH_HEADER: &str = "x-branch-id";
/// Global-admin branch simulation.
pub const SIMULATE_BRANCH_HEADER: &str = "x-simulate-branch-id";

/// Raw branch-selection inputs taken from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSelection {
    pub requested_branch: Option<String>,
    pub simulated_branch: Option<String>,
}

impl BranchSelection {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            requested_branch: read(BRANCH_HEADER),
            simulated_branch: read(SIMULATE_BRANCH_HEADER),
        }
    }
}

/// A 403 carrying a stable reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzDenial {
    pub code: AuthzCode,
    pub message: String,
}

impl AuthzDenial {
    pub fn new(code: AuthzCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }
}

impl From<PolicyDecision> for AuthzDenial {
    fn from(decision: PolicyDecision) -> Self {
        Self {
            code: decision.code,
            message: decision.message,
        }
    }
}

impl IntoResponse for AuthzDenial {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "code": self.code.as_str(),
                "message": self.message,
            })),
        )
            .into_response()
    }
}

fn parse_branch(raw: &str) -> Option<StringUuid> {
    StringUuid::parse_str(raw).ok()
}

fn pick_branch(raw: Option<&str>) -> Result<Option<StringUuid>, AuthzDenial> {
    raw.map(|raw| parse_branch(raw).ok_or_else(|| AuthzDenial::new(AuthzCode::BranchForbidden)))
        .transpose()
}

/// Resolve the authorization context for `identity`.
///
/// Rules, in order:
/// 1. accounts flagged for access review are rejected;
/// 2. only global admins may simulate a branch;
/// 3. staff with a home branch must have exactly one ACTIVE assignment and
///    cannot switch away from it;
/// 4. everyone else may pick a branch from their allowed list
///    (global admins and customers: any branch).
pub fn resolve_access_context(
    identity: &Identity,
    selection: &BranchSelection,
) -> Result<AuthorizationContext, AuthzDenial> {
    if identity.access_review_required {
        return Err(AuthzDenial::new(AuthzCode::AccessReviewRequired));
    }

    let kind = identity.classify();

    if let Some(raw) = selection.simulated_branch.as_deref() {
        if kind != ActorKind::GlobalAdmin {
            return Err(AuthzDenial::new(AuthzCode::SimulationForbidden));
        }
        let branch = parse_branch(raw).ok_or_else(|| AuthzDenial::new(AuthzCode::BranchForbidden))?;
        return Ok(AuthorizationContext::new(
            identity,
            BranchResolution {
                active_branch_id: Some(branch),
                simulated_branch_id: Some(branch),
                context_mode: ContextMode::Simulated,
                scope_mode: ScopeMode::Branch,
            },
        ));
    }

    let requested = selection.requested_branch.as_deref();
    let (active_branch_id, scope_mode) = match kind {
        ActorKind::GlobalAdmin => (pick_branch(requested)?, ScopeMode::Global),
        ActorKind::Customer => (pick_branch(requested)?, ScopeMode::Branch),
        ActorKind::BranchStaff if !(identity.uses_legacy_role() && identity.role.is_some()) => {
            let mut active = identity.active_assignments();
            let (Some(home), None) = (active.next(), active.next()) else {
                return Err(AuthzDenial::new(AuthzCode::InvalidBranchAssignment));
            };
            if let Some(raw) = requested {
                if parse_branch(raw) != Some(home.branch_id) {
                    return Err(AuthzDenial::new(AuthzCode::BranchSwitchForbidden));
                }
            }
            (Some(home.branch_id), ScopeMode::Branch)
        }
        // Task-only actors and legacy flat-role accounts have no home branch.
        ActorKind::TaskOnly | ActorKind::BranchStaff => {
            let active = match requested {
                None => None,
                Some(raw) => {
                    let branch = parse_branch(raw)
                        .filter(|b| identity.active_assignments().any(|a| a.branch_id == *b))
                        .ok_or_else(|| AuthzDenial::new(AuthzCode::BranchForbidden))?;
                    Some(branch)
                }
            };
            (active, ScopeMode::Branch)
        }
    };

    Ok(AuthorizationContext::new(
        identity,
        BranchResolution {
            active_branch_id,
            simulated_branch_id: None,
            context_mode: ContextMode::Normal,
            scope_mode,
        },
    ))
}

/// Shared state for access-context middleware
#[derive(Clone)]
pub struct AccessContextState {
    authz_audit: AuthzAuditService,
}

impl AccessContextState {
    pub fn new(authz_audit: AuthzAuditService) -> Self {
        Self { authz_audit }
    }
}

pub async fn access_context_middleware(
    State(state): State<AccessContextState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<Identity>().cloned() else {
        return unauthorized_response(AUTH_REQUIRED, "Authentication required");
    };
    let selection = BranchSelection::from_headers(request.headers());

    match resolve_access_context(&identity, &selection) {
        Ok(context) => {
            let scope = DataScope::from_context(&context);
            tracing::debug!(
                actor_id = %context.actor_id,
                active_branch_id = ?context.active_branch_id,
                scope_mode = context.scope_mode.as_str(),
                simulated = context.is_simulated(),
                "Access context resolved"
            );
            request.extensions_mut().insert(context);
            request.extensions_mut().insert(scope);
            DATA_SCOPE.scope(scope, next.run(request)).await
        }
        Err(denial) => {
            let (parts, _body) = request.into_parts();
            tracing::info!(
                actor_id = %identity.user_id,
                code = denial.code.as_str(),
                "Access context denied"
            );
            state
                .authz_audit
                .record(AuthzAuditLogEntry {
                    id: StringUuid::new_v4(),
                    actor_id: Some(identity.user_id),
                    action: None,
                    decision: AuthzDecision::Deny,
                    reason_code: denial.code.as_str().to_string(),
                    scope_mode: None,
                    active_branch_id: None,
                    resource_type: None,
                    resource_id: None,
                    request_context: Some(super::request_context(&parts)),
                    created_at: Utc::now(),
                })
                .await;
            denial.into_response()
        }
    }
}
