//! Audit trail records: business audit entries and authorization decisions

use super::{ScopeMode, StringUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failed => "FAILED",
        }
    }

    /// Any 4xx/5xx is a failure.
    pub fn from_status(status: u16) -> Self {
        if status >= 400 {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Success
        }
    }
}

impl std::str::FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(AuditOutcome::Success),
            "FAILED" => Ok(AuditOutcome::Failed),
            other => Err(format!("unknown audit outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    User,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "USER",
            ActorType::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActor {
    pub actor_type: ActorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<StringUuid>,
    pub role: String,
    /// Where the change came from (e.g. "admin_api", "payment_webhook")
    pub source: String,
}

impl AuditActor {
    pub fn system(source: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::System,
            user_id: None,
            role: "system".to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    pub http_status: u16,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Immutable business audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: StringUuid,
    pub entity_type: String,
    pub entity_id: String,
    pub order_id: Option<String>,
    pub branch_id: Option<StringUuid>,
    pub action_type: String,
    pub outcome: AuditOutcome,
    pub actor: AuditActor,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub changed_paths: Vec<String>,
    pub note: Option<String>,
    pub reason: Option<String>,
    pub request_context: Option<RequestContext>,
    pub failure_context: Option<FailureContext>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit log query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<StringUuid>,
    pub branch_id: Option<StringUuid>,
    pub action_type: Option<String>,
    pub outcome: Option<AuditOutcome>,
    #[serde(rename = "from")]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(rename = "to")]
    pub to_date: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl AuditLogQuery {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.entity_type
            .as_ref()
            .is_none_or(|v| *v == entry.entity_type)
            && self.entity_id.as_ref().is_none_or(|v| *v == entry.entity_id)
            && self
                .actor_id
                .is_none_or(|v| entry.actor.user_id == Some(v))
            && self.branch_id.is_none_or(|v| entry.branch_id == Some(v))
            && self
                .action_type
                .as_ref()
                .is_none_or(|v| *v == entry.action_type)
            && self.outcome.is_none_or(|v| v == entry.outcome)
            && self.from_date.is_none_or(|v| entry.created_at >= v)
            && self.to_date.is_none_or(|v| entry.created_at <= v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthzDecision {
    Allow,
    Deny,
}

impl AuthzDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthzDecision::Allow => "ALLOW",
            AuthzDecision::Deny => "DENY",
        }
    }
}

/// Record of one authorization decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzAuditLogEntry {
    pub id: StringUuid,
    pub actor_id: Option<StringUuid>,
    pub action: Option<String>,
    pub decision: AuthzDecision,
    pub reason_code: String,
    pub scope_mode: Option<ScopeMode>,
    pub active_branch_id: Option<StringUuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub request_context: Option<RequestContext>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthzAuditLogQuery {
    pub actor_id: Option<StringUuid>,
    pub action: Option<String>,
    pub decision: Option<AuthzDecision>,
    pub reason_code: Option<String>,
    pub branch_id: Option<StringUuid>,
    #[serde(rename = "from")]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(rename = "to")]
    pub to_date: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl AuthzAuditLogQuery {
    pub fn matches(&self, entry: &AuthzAuditLogEntry) -> bool {
        self.actor_id.is_none_or(|v| entry.actor_id == Some(v))
            && self
                .action
                .as_ref()
                .is_none_or(|v| entry.action.as_deref() == Some(v.as_str()))
            && self.decision.is_none_or(|v| v == entry.decision)
            && self
                .reason_code
                .as_ref()
                .is_none_or(|v| *v == entry.reason_code)
            && self
                .branch_id
                .is_none_or(|v| entry.active_branch_id == Some(v))
            && self.from_date.is_none_or(|v| entry.created_at >= v)
            && self.to_date.is_none_or(|v| entry.created_at <= v)
    }
}
