//! Authorization decision log repository

use super::audit::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::domain::{
    AuthzAuditLogEntry, AuthzAuditLogQuery, AuthzDecision, RequestContext, ScopeMode, StringUuid,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthzAuditRepository: Send + Sync {
    async fn insert(&self, entry: &AuthzAuditLogEntry) -> Result<()>;
    async fn find(&self, query: &AuthzAuditLogQuery) -> Result<Vec<AuthzAuditLogEntry>>;
    async fn count(&self, query: &AuthzAuditLogQuery) -> Result<i64>;
}

#[derive(Debug, FromRow)]
struct AuthzAuditRow {
    id: StringUuid,
    actor_id: Option<StringUuid>,
    action: Option<String>,
    decision: String,
    reason_code: String,
    scope_mode: Option<String>,
    active_branch_id: Option<StringUuid>,
    resource_type: Option<String>,
    resource_id: Option<String>,
    request_context: Option<Json<RequestContext>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuthzAuditRow> for AuthzAuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuthzAuditRow) -> Result<Self> {
        let decision = match row.decision.as_str() {
            "ALLOW" => AuthzDecision::Allow,
            "DENY" => AuthzDecision::Deny,
            other => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unknown authz decision: {}",
                    other
                )))
            }
        };
        let scope_mode = match row.scope_mode.as_deref() {
            None => None,
            Some("global") => Some(ScopeMode::Global),
            Some("assigned") => Some(ScopeMode::Assigned),
            Some("branch") => Some(ScopeMode::Branch),
            Some(other) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unknown scope mode: {}",
                    other
                )))
            }
        };

        Ok(AuthzAuditLogEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            decision,
            reason_code: row.reason_code,
            scope_mode,
            active_branch_id: row.active_branch_id,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            request_context: row.request_context.map(|j| j.0),
            created_at: row.created_at,
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, MySql>, query: &AuthzAuditLogQuery) {
    builder.push(" WHERE 1=1");
    if let Some(actor_id) = query.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id);
    }
    if let Some(ref action) = query.action {
        builder.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(decision) = query.decision {
        builder.push(" AND decision = ").push_bind(decision.as_str());
    }
    if let Some(ref reason_code) = query.reason_code {
        builder.push(" AND reason_code = ").push_bind(reason_code.clone());
    }
    if let Some(branch_id) = query.branch_id {
        builder.push(" AND active_branch_id = ").push_bind(branch_id);
    }
    if let Some(from_date) = query.from_date {
        builder.push(" AND created_at >= ").push_bind(from_date);
    }
    if let Some(to_date) = query.to_date {
        builder.push(" AND created_at <= ").push_bind(to_date);
    }
}

pub struct AuthzAuditRepositoryImpl {
    pool: MySqlPool,
}

impl AuthzAuditRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthzAuditRepository for AuthzAuditRepositoryImpl {
    async fn insert(&self, entry: &AuthzAuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_audit_logs (id, actor_id, action, decision, reason_code, scope_mode,
                active_branch_id, resource_type, resource_id, request_context, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(entry.decision.as_str())
        .bind(&entry.reason_code)
        .bind(entry.scope_mode.map(|m| m.as_str()))
        .bind(entry.active_branch_id)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.request_context.as_ref().map(Json))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, query: &AuthzAuditLogQuery) -> Result<Vec<AuthzAuditLogEntry>> {
        let mut builder = QueryBuilder::<MySql>::new(
            "SELECT id, actor_id, action, decision, reason_code, scope_mode, active_branch_id, \
             resource_type, resource_id, request_context, created_at FROM authz_audit_logs",
        );
        push_filters(&mut builder, query);

        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<AuthzAuditRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuthzAuditLogEntry::try_from).collect()
    }

    async fn count(&self, query: &AuthzAuditLogQuery) -> Result<i64> {
        let mut builder = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM authz_audit_logs");
        push_filters(&mut builder, query);
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }
}
