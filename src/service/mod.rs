//! Business logic layer

pub mod audit;
pub mod authz_audit;

pub use audit::{AuditEntryPayload, AuditService};
pub use authz_audit::AuthzAuditService;
