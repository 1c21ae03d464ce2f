//! Audit log reporting handlers
//!
//! Read-only. Rows are narrowed to the caller's [`DataScope`]: global
//! admins see everything, everyone else sees their active branch only.

use crate::api::{page_window, PaginatedResponse, SuccessResponse};
use crate::domain::{AuditLogQuery, AuthzAuditLogQuery, StringUuid};
use crate::error::{AppError, Result};
use crate::middleware::{BranchFilter, DataScope};
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

fn current_filter() -> BranchFilter {
    // Outside a resolved request nothing is visible.
    DataScope::current()
        .map(|scope| scope.branch_filter())
        .unwrap_or(BranchFilter::NoRows)
}

/// Branch restriction to apply to a query, or `None` when the caller can
/// see no rows for the requested branch.
fn visible_branch(
    filter: BranchFilter,
    requested: Option<StringUuid>,
) -> Option<Option<StringUuid>> {
    match filter {
        BranchFilter::Unrestricted => Some(requested),
        BranchFilter::Branch(active) => match requested {
            Some(requested) if requested != active => None,
            _ => Some(Some(active)),
        },
        BranchFilter::NoRows => None,
    }
}

/// GET /api/v1/audit-logs
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(mut query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse> {
    let (offset, limit) = page_window(query.offset, query.limit);
    let Some(branch_id) = visible_branch(current_filter(), query.branch_id) else {
        return Ok(Json(PaginatedResponse::from_window(Vec::new(), offset, limit, 0)));
    };
    query.branch_id = branch_id;
    query.offset = Some(offset);
    query.limit = Some(limit);

    let logs = state.audit_repo.find(&query).await?;
    let total = state.audit_repo.count(&query).await?;

    Ok(Json(PaginatedResponse::from_window(logs, offset, limit, total)))
}

/// GET /api/v1/audit-logs/{id}
pub async fn get_audit_log(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let entry = state
        .audit_repo
        .find_by_id(id)
        .await?
        .filter(|entry| match current_filter() {
            BranchFilter::Unrestricted => true,
            BranchFilter::Branch(active) => entry.branch_id == Some(active),
            BranchFilter::NoRows => false,
        })
        .ok_or_else(|| AppError::NotFound(format!("Audit log {} not found", id)))?;

    Ok(Json(SuccessResponse::new(entry)))
}

/// GET /api/v1/authz-audit-logs
pub async fn list_authz_audit_logs(
    State(state): State<AppState>,
    Query(mut query): Query<AuthzAuditLogQuery>,
) -> Result<impl IntoResponse> {
    let (offset, limit) = page_window(query.offset, query.limit);
    let Some(branch_id) = visible_branch(current_filter(), query.branch_id) else {
        return Ok(Json(PaginatedResponse::from_window(Vec::new(), offset, limit, 0)));
    };
    query.branch_id = branch_id;
    query.offset = Some(offset);
    query.limit = Some(limit);

    let logs = state.authz_audit_repo.find(&query).await?;
    let total = state.authz_audit_repo.count(&query).await?;

    Ok(Json(PaginatedResponse::from_window(logs, offset, limit, total)))
}
