//! Actor identity and per-request authorization context

use super::StringUuid;
use crate::policy::{build_permission_set, PermissionSet, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle state of a branch assignment. Only `Active` assignments count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Suspended,
    Revoked,
}

/// A user's roles inside one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchAssignment {
    pub branch_id: StringUuid,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub status: AssignmentStatus,
}

impl BranchAssignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

/// Authenticated actor as supplied by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: StringUuid,
    /// Flat pre-migration role. Only consulted when no structured role data exists.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub system_roles: Vec<Role>,
    #[serde(default)]
    pub task_roles: Vec<Role>,
    #[serde(default)]
    pub branch_assignments: Vec<BranchAssignment>,
    #[serde(default)]
    pub access_review_required: bool,
}

impl Identity {
    /// True when the actor carries neither system roles nor branch assignments,
    /// i.e. the legacy flat role is the only source of permissions.
    pub fn uses_legacy_role(&self) -> bool {
        self.system_roles.is_empty() && self.branch_assignments.is_empty()
    }

    pub fn is_global_admin(&self) -> bool {
        self.system_roles.contains(&Role::SuperAdmin)
            || (self.uses_legacy_role() && self.role == Some(Role::SuperAdmin))
    }

    pub fn is_customer(&self) -> bool {
        self.system_roles.contains(&Role::Customer)
            || (self.uses_legacy_role() && self.role == Some(Role::Customer))
    }

    pub fn active_assignments(&self) -> impl Iterator<Item = &BranchAssignment> {
        self.branch_assignments.iter().filter(|a| a.is_active())
    }

    /// Actor that only holds task roles and works without a home branch.
    pub fn is_task_only(&self) -> bool {
        let legacy_task = self.uses_legacy_role()
            && self.role.map(|r| r.is_task_role()).unwrap_or(false);
        (!self.task_roles.is_empty() || legacy_task) && self.active_assignments().next().is_none()
    }

    pub fn classify(&self) -> ActorKind {
        if self.is_global_admin() {
            ActorKind::GlobalAdmin
        } else if self.is_customer() {
            ActorKind::Customer
        } else if self.is_task_only() {
            ActorKind::TaskOnly
        } else {
            ActorKind::BranchStaff
        }
    }
}

/// Classification the resolver uses to pick a branch rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    GlobalAdmin,
    Customer,
    TaskOnly,
    BranchStaff,
}

/// Breadth at which a request is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    Global,
    Assigned,
    Branch,
}

impl ScopeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeMode::Global => "global",
            ScopeMode::Assigned => "assigned",
            ScopeMode::Branch => "branch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextMode {
    Normal,
    Simulated,
}

/// Branch resolution produced by the access-context resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchResolution {
    pub active_branch_id: Option<StringUuid>,
    pub simulated_branch_id: Option<StringUuid>,
    pub context_mode: ContextMode,
    pub scope_mode: ScopeMode,
}

/// Everything the policy engine needs to know about the actor, resolved once
/// per request and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationContext {
    pub actor_id: StringUuid,
    pub actor_kind: ActorKind,
    pub system_roles: BTreeSet<Role>,
    pub task_roles: BTreeSet<Role>,
    pub branch_assignments: Vec<BranchAssignment>,
    pub legacy_role: Option<Role>,
    pub active_branch_id: Option<StringUuid>,
    pub simulated_branch_id: Option<StringUuid>,
    pub context_mode: ContextMode,
    pub scope_mode: ScopeMode,
    permissions: PermissionSet,
}

impl AuthorizationContext {
    /// Build the context and compute its permission set.
    pub fn new(identity: &Identity, branch: BranchResolution) -> Self {
        let mut context = Self {
            actor_id: identity.user_id,
            actor_kind: identity.classify(),
            system_roles: identity.system_roles.iter().copied().collect(),
            task_roles: identity.task_roles.iter().copied().collect(),
            branch_assignments: identity.branch_assignments.clone(),
            legacy_role: identity.role,
            active_branch_id: branch.active_branch_id,
            simulated_branch_id: branch.simulated_branch_id,
            context_mode: branch.context_mode,
            scope_mode: branch.scope_mode,
            permissions: PermissionSet::default(),
        };
        context.permissions = build_permission_set(&context);
        context
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn is_global_admin(&self) -> bool {
        self.actor_kind == ActorKind::GlobalAdmin
    }

    pub fn is_simulated(&self) -> bool {
        self.context_mode == ContextMode::Simulated
    }

    pub fn uses_legacy_role(&self) -> bool {
        self.system_roles.is_empty() && self.branch_assignments.is_empty()
    }

    /// Branches with an ACTIVE assignment, in assignment order.
    pub fn assigned_branch_ids(&self) -> Vec<StringUuid> {
        self.branch_assignments
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.branch_id)
            .collect()
    }

    /// Roles granted inside the active branch only.
    pub fn active_branch_roles(&self) -> Vec<Role> {
        let Some(active) = self.active_branch_id else {
            return vec![];
        };
        self.branch_assignments
            .iter()
            .filter(|a| a.is_active() && a.branch_id == active)
            .flat_map(|a| a.roles.iter().copied())
            .collect()
    }

    pub fn has_own_work_only_role(&self) -> bool {
        self.task_roles.iter().any(|r| r.is_own_work_only())
            || (self.uses_legacy_role()
                && self.legacy_role.map(|r| r.is_own_work_only()).unwrap_or(false))
    }

    /// Role recorded on audit entries: the most specific role in effect.
    pub fn primary_role(&self) -> String {
        self.system_roles
            .iter()
            .next()
            .copied()
            .or_else(|| self.active_branch_roles().first().copied())
            .or_else(|| self.task_roles.iter().next().copied())
            .or(self.legacy_role)
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(n: u8) -> StringUuid {
        format!("00000000-0000-0000-0000-0000000000{:02}", n)
            .parse()
            .unwrap()
    }

    fn identity() -> Identity {
        Identity {
            user_id: StringUuid::new_v4(),
            role: None,
            system_roles: vec![],
            task_roles: vec![],
            branch_assignments: vec![],
            access_review_required: false,
        }
    }

    #[test]
    fn test_classify_global_admin() {
        let mut id = identity();
        id.system_roles = vec![Role::SuperAdmin];
        assert_eq!(id.classify(), ActorKind::GlobalAdmin);
    }

    #[test]
    fn test_classify_legacy_admin_only_without_structured_data() {
        let mut id = identity();
        id.role = Some(Role::SuperAdmin);
        assert_eq!(id.classify(), ActorKind::GlobalAdmin);

        id.branch_assignments = vec![BranchAssignment {
            branch_id: branch(1),
            roles: vec![Role::Cashier],
            status: AssignmentStatus::Active,
        }];
        assert_eq!(id.classify(), ActorKind::BranchStaff);
    }

    #[test]
    fn test_classify_task_only() {
        let mut id = identity();
        id.task_roles = vec![Role::DeliveryDriver];
        assert_eq!(id.classify(), ActorKind::TaskOnly);

        id.branch_assignments = vec![BranchAssignment {
            branch_id: branch(1),
            roles: vec![Role::SalesStaff],
            status: AssignmentStatus::Active,
        }];
        assert_eq!(id.classify(), ActorKind::BranchStaff);
    }

    #[test]
    fn test_assigned_branch_ids_skip_inactive() {
        let mut id = identity();
        id.branch_assignments = vec![
            BranchAssignment {
                branch_id: branch(1),
                roles: vec![Role::Cashier],
                status: AssignmentStatus::Active,
            },
            BranchAssignment {
                branch_id: branch(2),
                roles: vec![Role::BranchManager],
                status: AssignmentStatus::Suspended,
            },
        ];
        let ctx = AuthorizationContext::new(
            &id,
            BranchResolution {
                active_branch_id: Some(branch(1)),
                simulated_branch_id: None,
                context_mode: ContextMode::Normal,
                scope_mode: ScopeMode::Branch,
            },
        );
        assert_eq!(ctx.assigned_branch_ids(), vec![branch(1)]);
        assert_eq!(ctx.active_branch_roles(), vec![Role::Cashier]);
        assert_eq!(ctx.primary_role(), "cashier");
    }

    #[test]
    fn test_identity_deserializes_with_defaults() {
        let json = serde_json::json!({
            "user_id": "550e8400-e29b-41d4-a716-446655440000",
            "branch_assignments": [
                {"branch_id": "00000000-0000-0000-0000-000000000001", "roles": ["cashier"], "status": "ACTIVE"}
            ]
        });
        let id: Identity = serde_json::from_value(json).unwrap();
        assert!(id.system_roles.is_empty());
        assert!(!id.access_review_required);
        assert_eq!(id.branch_assignments[0].roles, vec![Role::Cashier]);
    }
}
