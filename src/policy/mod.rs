//! Branch-scoped authorization policy engine.
//!
//! Everything here is pure: no I/O, no shared mutable state. The same
//! request always yields the same decision and code.

pub mod catalog;

pub use catalog::{actions, permissions_for_role, Role, WILDCARD};

use crate::domain::{AuthorizationContext, ScopeMode, StringUuid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable set of action identifiers granted to an actor for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<&'static str>);

impl PermissionSet {
    fn grant_role(&mut self, role: Role) {
        self.0.extend(permissions_for_role(role).iter().copied());
    }

    /// `"*"` or an exact match.
    pub fn allows(&self, action: &str) -> bool {
        self.0.contains(WILDCARD) || self.0.contains(action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Union of system roles, task roles and the roles of the assignment that
/// matches the active branch. Assignments in any other branch never
/// contribute; with no active branch, no branch-local role contributes.
pub fn build_permission_set(context: &AuthorizationContext) -> PermissionSet {
    let mut permissions = PermissionSet::default();

    for role in &context.system_roles {
        permissions.grant_role(*role);
    }
    for role in &context.task_roles {
        permissions.grant_role(*role);
    }
    for role in context.active_branch_roles() {
        permissions.grant_role(role);
    }

    // Migration shim for accounts that predate structured roles.
    if context.uses_legacy_role() {
        if let Some(role) = context.legacy_role {
            permissions.grant_role(role);
        }
    }

    permissions
}

/// Stable reason codes. Clients and audit dashboards key off these strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthzCode {
    #[serde(rename = "AUTHZ_ALLOWED")]
    Allowed,
    #[serde(rename = "AUTHZ_CONTEXT_MISSING")]
    ContextMissing,
    #[serde(rename = "AUTHZ_ACTION_MISSING")]
    ActionMissing,
    #[serde(rename = "AUTHZ_ACTION_DENIED")]
    ActionDenied,
    #[serde(rename = "AUTHZ_GLOBAL_SCOPE_DENIED")]
    GlobalScopeDenied,
    #[serde(rename = "AUTHZ_ACTIVE_BRANCH_REQUIRED")]
    ActiveBranchRequired,
    #[serde(rename = "AUTHZ_NO_BRANCH_ASSIGNED")]
    NoBranchAssigned,
    #[serde(rename = "AUTHZ_BRANCH_FORBIDDEN")]
    BranchForbidden,
    #[serde(rename = "AUTHZ_TASK_NOT_ASSIGNED")]
    TaskNotAssigned,
    #[serde(rename = "AUTHZ_INVALID_BRANCH_ASSIGNMENT")]
    InvalidBranchAssignment,
    #[serde(rename = "AUTHZ_BRANCH_SWITCH_FORBIDDEN")]
    BranchSwitchForbidden,
    #[serde(rename = "AUTHZ_SIMULATION_FORBIDDEN")]
    SimulationForbidden,
    #[serde(rename = "AUTHZ_ACCESS_REVIEW_REQUIRED")]
    AccessReviewRequired,
}

impl AuthzCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthzCode::Allowed => "AUTHZ_ALLOWED",
            AuthzCode::ContextMissing => "AUTHZ_CONTEXT_MISSING",
            AuthzCode::ActionMissing => "AUTHZ_ACTION_MISSING",
            AuthzCode::ActionDenied => "AUTHZ_ACTION_DENIED",
            AuthzCode::GlobalScopeDenied => "AUTHZ_GLOBAL_SCOPE_DENIED",
            AuthzCode::ActiveBranchRequired => "AUTHZ_ACTIVE_BRANCH_REQUIRED",
            AuthzCode::NoBranchAssigned => "AUTHZ_NO_BRANCH_ASSIGNED",
            AuthzCode::BranchForbidden => "AUTHZ_BRANCH_FORBIDDEN",
            AuthzCode::TaskNotAssigned => "AUTHZ_TASK_NOT_ASSIGNED",
            AuthzCode::InvalidBranchAssignment => "AUTHZ_INVALID_BRANCH_ASSIGNMENT",
            AuthzCode::BranchSwitchForbidden => "AUTHZ_BRANCH_SWITCH_FORBIDDEN",
            AuthzCode::SimulationForbidden => "AUTHZ_SIMULATION_FORBIDDEN",
            AuthzCode::AccessReviewRequired => "AUTHZ_ACCESS_REVIEW_REQUIRED",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            AuthzCode::Allowed => "Access granted",
            AuthzCode::ContextMissing => "Authorization context is missing",
            AuthzCode::ActionMissing => "No action was declared for this route",
            AuthzCode::ActionDenied => "You do not have permission to perform this action",
            AuthzCode::GlobalScopeDenied => "This action requires global administrator access",
            AuthzCode::ActiveBranchRequired => "An active branch is required for this action",
            AuthzCode::NoBranchAssigned => "You are not assigned to any branch",
            AuthzCode::BranchForbidden => "You do not have access to this branch",
            AuthzCode::TaskNotAssigned => "This task is not assigned to you",
            AuthzCode::InvalidBranchAssignment => {
                "Staff accounts must have exactly one active branch assignment"
            }
            AuthzCode::BranchSwitchForbidden => "You cannot switch to another branch",
            AuthzCode::SimulationForbidden => "Only global administrators can simulate a branch",
            AuthzCode::AccessReviewRequired => "Your account is pending an access review",
        }
    }
}

impl std::fmt::Display for AuthzCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub code: AuthzCode,
    pub message: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            code: AuthzCode::Allowed,
            message: AuthzCode::Allowed.default_message().to_string(),
        }
    }

    pub fn deny(code: AuthzCode) -> Self {
        Self {
            allowed: false,
            code,
            message: code.default_message().to_string(),
        }
    }
}

/// The resource a request targets, as far as the policy engine cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub branch_id: Option<StringUuid>,
    pub assignee_id: Option<StringUuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub action: Option<&'a str>,
    pub context: Option<&'a AuthorizationContext>,
    pub mode: ScopeMode,
    pub require_active_branch: bool,
    pub resource: Option<&'a ResourceRef>,
}

/// Evaluate a request. Coarse checks run before resource checks so the
/// returned code is stable for a given input.
pub fn evaluate_policy(request: &PolicyRequest<'_>) -> PolicyDecision {
    let Some(context) = request.context else {
        return PolicyDecision::deny(AuthzCode::ContextMissing);
    };
    let Some(action) = request.action.filter(|a| !a.trim().is_empty()) else {
        return PolicyDecision::deny(AuthzCode::ActionMissing);
    };
    if !context.permissions().allows(action) {
        return PolicyDecision::deny(AuthzCode::ActionDenied);
    }

    let is_global_admin = context.is_global_admin();
    match request.mode {
        ScopeMode::Global if !is_global_admin => {
            return PolicyDecision::deny(AuthzCode::GlobalScopeDenied);
        }
        ScopeMode::Branch if request.require_active_branch && context.active_branch_id.is_none() => {
            return PolicyDecision::deny(AuthzCode::ActiveBranchRequired);
        }
        ScopeMode::Assigned if !is_global_admin && context.assigned_branch_ids().is_empty() => {
            return PolicyDecision::deny(AuthzCode::NoBranchAssigned);
        }
        _ => {}
    }

    let Some(resource) = request.resource else {
        return PolicyDecision::allow();
    };

    if let Some(resource_branch) = resource.branch_id {
        if !is_global_admin {
            let permitted = match request.mode {
                ScopeMode::Assigned => context.assigned_branch_ids().contains(&resource_branch),
                ScopeMode::Branch => context.active_branch_id == Some(resource_branch),
                // only global admins get past the scope check above
                ScopeMode::Global => true,
            };
            if !permitted {
                return PolicyDecision::deny(AuthzCode::BranchForbidden);
            }
        }
    }

    if let Some(assignee) = resource.assignee_id {
        if !is_global_admin && context.has_own_work_only_role() && assignee != context.actor_id {
            return PolicyDecision::deny(AuthzCode::TaskNotAssigned);
        }
    }

    PolicyDecision::allow()
}
