//! Audit entry writer

use crate::audit::mask_sensitive_data;
use crate::domain::{
    AuditActor, AuditLogEntry, AuditOutcome, FailureContext, RequestContext, StringUuid,
};
use crate::error::Result;
use crate::repository::AuditLogRepository;
use crate::telemetry::metrics as telemetry_metrics;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use validator::Validate;

/// Input for one audit entry. Values are stored masked.
#[derive(Debug, Clone, Validate)]
pub struct AuditEntryPayload {
    #[validate(length(min = 1, max = 64))]
    pub entity_type: String,
    #[validate(length(min = 1, max = 128))]
    pub entity_id: String,
    #[validate(length(min = 1, max = 64))]
    pub action_type: String,
    pub outcome: AuditOutcome,
    pub order_id: Option<String>,
    pub branch_id: Option<StringUuid>,
    /// `None` records the entry as a SYSTEM change
    pub actor: Option<AuditActor>,
    pub source: Option<String>,
    pub old_values: Value,
    pub new_values: Value,
    pub changed_paths: Vec<String>,
    pub note: Option<String>,
    pub reason: Option<String>,
    pub request_context: Option<RequestContext>,
    pub failure_context: Option<FailureContext>,
    pub metadata: Value,
}

impl AuditEntryPayload {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action_type: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action_type: action_type.into(),
            outcome,
            order_id: None,
            branch_id: None,
            actor: None,
            source: None,
            old_values: Value::Object(Map::new()),
            new_values: Value::Object(Map::new()),
            changed_paths: Vec::new(),
            note: None,
            reason: None,
            request_context: None,
            failure_context: None,
            metadata: Value::Object(Map::new()),
        }
    }

    fn normalize(mut self) -> Self {
        self.entity_type = self.entity_type.trim().to_string();
        self.entity_id = self.entity_id.trim().to_string();
        self.action_type = self.action_type.trim().to_string();
        self.order_id = trimmed(self.order_id);
        self.source = trimmed(self.source);
        self.note = trimmed(self.note);
        self.reason = trimmed(self.reason);

        self.changed_paths = self
            .changed_paths
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self.changed_paths.sort();
        self.changed_paths.dedup();

        if self.outcome == AuditOutcome::Success {
            self.failure_context = None;
        }
        self
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn object_or_empty(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

pub struct AuditService {
    repo: Arc<dyn AuditLogRepository>,
    enabled: AtomicBool,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditLogRepository>, enabled: bool) -> Self {
        Self {
            repo,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Global switch. Call sites keep calling the writer; it returns `None`
    /// while disabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Audit writing toggled");
    }

    /// Validate, mask and persist one entry.
    pub async fn write_audit_entry(&self, payload: AuditEntryPayload) -> Result<Option<AuditLogEntry>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let payload = payload.normalize();
        payload.validate()?;

        let actor = payload
            .actor
            .unwrap_or_else(|| AuditActor::system(payload.source.as_deref().unwrap_or("system")));

        let entry = AuditLogEntry {
            id: StringUuid::new_v4(),
            entity_type: payload.entity_type,
            entity_id: payload.entity_id,
            order_id: payload.order_id,
            branch_id: payload.branch_id,
            action_type: payload.action_type,
            outcome: payload.outcome,
            actor,
            old_values: mask_sensitive_data(&object_or_empty(payload.old_values)),
            new_values: mask_sensitive_data(&object_or_empty(payload.new_values)),
            changed_paths: payload.changed_paths,
            note: payload.note,
            reason: payload.reason,
            request_context: payload.request_context,
            failure_context: payload.failure_context,
            metadata: mask_sensitive_data(&object_or_empty(payload.metadata)),
            created_at: Utc::now(),
        };

        let stored = self.repo.insert(entry).await?;
        telemetry_metrics::record_audit_entry(stored.outcome.as_str());
        tracing::debug!(
            audit_id = %stored.id,
            entity_type = %stored.entity_type,
            entity_id = %stored.entity_id,
            action_type = %stored.action_type,
            outcome = stored.outcome.as_str(),
            "Audit entry written"
        );
        Ok(Some(stored))
    }

    /// Like [`write_audit_entry`](Self::write_audit_entry), but a failure is
    /// logged and swallowed so it never affects the operation being recorded.
    pub async fn safe_write_audit_entry(&self, payload: AuditEntryPayload) -> Option<AuditLogEntry> {
        let entity_type = payload.entity_type.clone();
        let entity_id = payload.entity_id.clone();
        let action_type = payload.action_type.clone();
        let request_id = payload
            .request_context
            .as_ref()
            .and_then(|c| c.request_id.clone());

        match self.write_audit_entry(payload).await {
            Ok(entry) => entry,
            Err(e) => {
                telemetry_metrics::record_audit_write_failure();
                tracing::warn!(
                    error = %e,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    action_type = %action_type,
                    request_id = ?request_id,
                    "Failed to write audit entry"
                );
                None
            }
        }
    }
}
