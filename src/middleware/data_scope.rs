//! Row-level scope handed to the data-access layer.
//!
//! The access-context middleware runs the remainder of the request inside
//! [`DATA_SCOPE`], so repositories and report queries can read the resolved
//! branch without it being threaded through every call.

use crate::domain::{AuthorizationContext, ScopeMode, StringUuid};
use serde::Serialize;

tokio::task_local! {
    pub static DATA_SCOPE: DataScope;
}

/// Row restriction derived from a [`DataScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchFilter {
    Unrestricted,
    Branch(StringUuid),
    /// Non-global actor with no active branch: no rows are visible.
    NoRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataScope {
    pub user_id: StringUuid,
    pub active_branch_id: Option<StringUuid>,
    pub is_global_admin: bool,
    pub scope_mode: ScopeMode,
}

impl DataScope {
    pub fn from_context(context: &AuthorizationContext) -> Self {
        Self {
            user_id: context.actor_id,
            active_branch_id: context.active_branch_id,
            is_global_admin: context.is_global_admin(),
            scope_mode: context.scope_mode,
        }
    }

    /// Scope of the current task, if it runs inside a request.
    pub fn current() -> Option<DataScope> {
        DATA_SCOPE.try_with(|scope| *scope).ok()
    }

    pub fn branch_filter(&self) -> BranchFilter {
        if self.is_global_admin && self.scope_mode == ScopeMode::Global {
            return BranchFilter::Unrestricted;
        }
        match self.active_branch_id {
            Some(branch) => BranchFilter::Branch(branch),
            None => BranchFilter::NoRows,
        }
    }
}
