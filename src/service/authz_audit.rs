//! Authorization decision recorder

use crate::domain::{AuthzAuditLogEntry, AuthzDecision};
use crate::repository::AuthzAuditRepository;
use crate::telemetry::metrics as telemetry_metrics;
use std::sync::Arc;

/// Persists authorization decisions. DENY is always recorded; ALLOW only
/// when enabled both globally and for the route.
#[derive(Clone)]
pub struct AuthzAuditService {
    repo: Arc<dyn AuthzAuditRepository>,
    log_allow_decisions: bool,
}

impl AuthzAuditService {
    pub fn new(repo: Arc<dyn AuthzAuditRepository>, log_allow_decisions: bool) -> Self {
        Self {
            repo,
            log_allow_decisions,
        }
    }

    /// Best-effort: a storage failure is logged and never changes the decision.
    pub async fn record(&self, entry: AuthzAuditLogEntry) {
        telemetry_metrics::record_authz_decision(
            entry.decision.as_str(),
            reason_label(&entry.reason_code),
        );

        if entry.decision == AuthzDecision::Allow && !self.log_allow_decisions {
            return;
        }

        if let Err(e) = self.repo.insert(&entry).await {
            telemetry_metrics::record_audit_write_failure();
            tracing::warn!(
                error = %e,
                actor_id = ?entry.actor_id,
                action = ?entry.action,
                decision = entry.decision.as_str(),
                code = %entry.reason_code,
                "Failed to record authorization decision"
            );
        }
    }
}

/// Metric labels need `'static` strings; codes outside the known set collapse.
fn reason_label(code: &str) -> &'static str {
    use crate::policy::AuthzCode::*;
    [
        Allowed,
        ContextMissing,
        ActionMissing,
        ActionDenied,
        GlobalScopeDenied,
        ActiveBranchRequired,
        NoBranchAssigned,
        BranchForbidden,
        TaskNotAssigned,
        InvalidBranchAssignment,
        BranchSwitchForbidden,
        SimulationForbidden,
        AccessReviewRequired,
    ]
    .iter()
    .map(|c| c.as_str())
    .find(|c| *c == code)
    .unwrap_or("OTHER")
}
