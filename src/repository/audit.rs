//! Append-only audit log repository

use super::append_only::{self, WriteOperation};
use crate::domain::{
    ActorType, AuditActor, AuditLogEntry, AuditLogQuery, AuditOutcome, FailureContext,
    RequestContext, StringUuid,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};

pub const AUDIT_LOGS_TABLE: &str = "audit_logs";

/// Default and maximum page size for audit queries
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

/// A write request against the audit log. Only `Insert` is ever admitted.
#[derive(Debug, Clone)]
pub enum AuditWrite {
    Insert(Box<AuditLogEntry>),
    Update {
        id: StringUuid,
        changes: serde_json::Value,
    },
    Replace {
        id: StringUuid,
        entry: Box<AuditLogEntry>,
    },
    Delete {
        id: StringUuid,
    },
    UpdateMany {
        query: AuditLogQuery,
        changes: serde_json::Value,
    },
    DeleteMany {
        query: AuditLogQuery,
    },
}

impl AuditWrite {
    pub fn operation(&self) -> WriteOperation {
        match self {
            AuditWrite::Insert(_) => WriteOperation::Insert,
            AuditWrite::Update { .. } => WriteOperation::Update,
            AuditWrite::Replace { .. } => WriteOperation::Replace,
            AuditWrite::Delete { .. } => WriteOperation::Delete,
            AuditWrite::UpdateMany { .. } => WriteOperation::UpdateMany,
            AuditWrite::DeleteMany { .. } => WriteOperation::DeleteMany,
        }
    }

    /// Run the append-only guard and hand back the entry to insert.
    pub fn into_insert(self) -> Result<AuditLogEntry> {
        append_only::admit(AUDIT_LOGS_TABLE, self.operation())?;
        match self {
            AuditWrite::Insert(entry) => Ok(*entry),
            other => Err(append_only::violation(
                AUDIT_LOGS_TABLE,
                other.operation().as_str(),
            )),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Single write path. Adapters must route every write through
    /// [`AuditWrite::into_insert`].
    async fn write(&self, write: AuditWrite) -> Result<AuditLogEntry>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<AuditLogEntry>>;
    async fn find(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>>;
    async fn count(&self, query: &AuditLogQuery) -> Result<i64>;

    async fn insert(&self, entry: AuditLogEntry) -> Result<AuditLogEntry> {
        self.write(AuditWrite::Insert(Box::new(entry))).await
    }

    async fn update(&self, id: StringUuid, changes: serde_json::Value) -> Result<()> {
        self.write(AuditWrite::Update { id, changes }).await.map(|_| ())
    }

    async fn replace(&self, id: StringUuid, entry: AuditLogEntry) -> Result<()> {
        self.write(AuditWrite::Replace {
            id,
            entry: Box::new(entry),
        })
        .await
        .map(|_| ())
    }

    async fn delete(&self, id: StringUuid) -> Result<()> {
        self.write(AuditWrite::Delete { id }).await.map(|_| ())
    }

    async fn update_many(&self, query: AuditLogQuery, changes: serde_json::Value) -> Result<()> {
        self.write(AuditWrite::UpdateMany { query, changes })
            .await
            .map(|_| ())
    }

    async fn delete_many(&self, query: AuditLogQuery) -> Result<()> {
        self.write(AuditWrite::DeleteMany { query }).await.map(|_| ())
    }
}

/// Row shape of `audit_logs`
#[derive(Debug, FromRow)]
struct AuditLogRow {
    id: StringUuid,
    entity_type: String,
    entity_id: String,
    order_id: Option<String>,
    branch_id: Option<StringUuid>,
    action_type: String,
    outcome: String,
    actor_type: String,
    actor_user_id: Option<StringUuid>,
    actor_role: String,
    actor_source: String,
    old_values: Json<serde_json::Value>,
    new_values: Json<serde_json::Value>,
    changed_paths: Json<Vec<String>>,
    note: Option<String>,
    reason: Option<String>,
    request_context: Option<Json<RequestContext>>,
    failure_context: Option<Json<FailureContext>>,
    metadata: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self> {
        let outcome: AuditOutcome = row
            .outcome
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
        let actor_type = match row.actor_type.as_str() {
            "USER" => ActorType::User,
            "SYSTEM" => ActorType::System,
            other => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unknown actor type in audit_logs: {}",
                    other
                )))
            }
        };

        Ok(AuditLogEntry {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            order_id: row.order_id,
            branch_id: row.branch_id,
            action_type: row.action_type,
            outcome,
            actor: AuditActor {
                actor_type,
                user_id: row.actor_user_id,
                role: row.actor_role,
                source: row.actor_source,
            },
            old_values: row.old_values.0,
            new_values: row.new_values.0,
            changed_paths: row.changed_paths.0,
            note: row.note,
            reason: row.reason,
            request_context: row.request_context.map(|j| j.0),
            failure_context: row.failure_context.map(|j| j.0),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, entity_type, entity_id, order_id, branch_id, action_type, outcome, \
     actor_type, actor_user_id, actor_role, actor_source, old_values, new_values, changed_paths, \
     note, reason, request_context, failure_context, metadata, created_at FROM audit_logs";

fn push_filters(builder: &mut QueryBuilder<'_, MySql>, query: &AuditLogQuery) {
    builder.push(" WHERE 1=1");
    if let Some(ref entity_type) = query.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(ref entity_id) = query.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
    if let Some(actor_id) = query.actor_id {
        builder.push(" AND actor_user_id = ").push_bind(actor_id);
    }
    if let Some(branch_id) = query.branch_id {
        builder.push(" AND branch_id = ").push_bind(branch_id);
    }
    if let Some(ref action_type) = query.action_type {
        builder.push(" AND action_type = ").push_bind(action_type.clone());
    }
    if let Some(outcome) = query.outcome {
        builder.push(" AND outcome = ").push_bind(outcome.as_str());
    }
    if let Some(from_date) = query.from_date {
        builder.push(" AND created_at >= ").push_bind(from_date);
    }
    if let Some(to_date) = query.to_date {
        builder.push(" AND created_at <= ").push_bind(to_date);
    }
}

pub struct AuditLogRepositoryImpl {
    pool: MySqlPool,
}

impl AuditLogRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for AuditLogRepositoryImpl {
    async fn write(&self, write: AuditWrite) -> Result<AuditLogEntry> {
        let entry = write.into_insert()?;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (id, entity_type, entity_id, order_id, branch_id, action_type, outcome,
                actor_type, actor_user_id, actor_role, actor_source, old_values, new_values, changed_paths,
                note, reason, request_context, failure_context, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.order_id)
        .bind(entry.branch_id)
        .bind(&entry.action_type)
        .bind(entry.outcome.as_str())
        .bind(entry.actor.actor_type.as_str())
        .bind(entry.actor.user_id)
        .bind(&entry.actor.role)
        .bind(&entry.actor.source)
        .bind(Json(&entry.old_values))
        .bind(Json(&entry.new_values))
        .bind(Json(&entry.changed_paths))
        .bind(&entry.note)
        .bind(&entry.reason)
        .bind(entry.request_context.as_ref().map(Json))
        .bind(entry.failure_context.as_ref().map(Json))
        .bind(Json(&entry.metadata))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(entry),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(append_only::violation(AUDIT_LOGS_TABLE, "duplicate_insert"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<AuditLogEntry>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
        builder.push(" WHERE id = ").push_bind(id);
        let row = builder
            .build_query_as::<AuditLogRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(AuditLogEntry::try_from).transpose()
    }

    async fn find(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
        push_filters(&mut builder, query);

        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    async fn count(&self, query: &AuditLogQuery) -> Result<i64> {
        let mut builder = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut builder, query);
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }
}
