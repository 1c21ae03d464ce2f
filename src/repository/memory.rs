//! In-process repositories.
//!
//! Used when no `DATABASE_URL` is configured and by the router tests. They
//! honor the same append-only guard as the MySQL adapters.

use super::append_only;
use super::audit::{AuditLogRepository, AuditWrite, AUDIT_LOGS_TABLE, DEFAULT_LIMIT, MAX_LIMIT};
use super::authz_audit::AuthzAuditRepository;
use crate::domain::{
    AuditLogEntry, AuditLogQuery, AuthzAuditLogEntry, AuthzAuditLogQuery, StringUuid,
};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

fn page<T: Clone>(items: Vec<&T>, offset: Option<i64>, limit: Option<i64>) -> Vec<T> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;
    let offset = offset.unwrap_or(0).max(0) as usize;
    items
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry in insertion order.
    pub async fn all(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn write(&self, write: AuditWrite) -> Result<AuditLogEntry> {
        let entry = write.into_insert()?;

        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(append_only::violation(AUDIT_LOGS_TABLE, "duplicate_insert"));
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn find(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<&AuditLogEntry> = entries.iter().filter(|e| query.matches(e)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(matched, query.offset, query.limit))
    }

    async fn count(&self, query: &AuditLogQuery) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| query.matches(e)).count() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryAuthzAuditRepository {
    entries: RwLock<Vec<AuthzAuditLogEntry>>,
}

impl InMemoryAuthzAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AuthzAuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuthzAuditRepository for InMemoryAuthzAuditRepository {
    async fn insert(&self, entry: &AuthzAuditLogEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn find(&self, query: &AuthzAuditLogQuery) -> Result<Vec<AuthzAuditLogEntry>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<&AuthzAuditLogEntry> =
            entries.iter().filter(|e| query.matches(e)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(matched, query.offset, query.limit))
    }

    async fn count(&self, query: &AuthzAuditLogQuery) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| query.matches(e)).count() as i64)
    }
}
