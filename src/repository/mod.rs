//! Data access layer (Repository pattern)

pub mod append_only;
pub mod audit;
pub mod authz_audit;
pub mod memory;

pub use append_only::WriteOperation;
pub use audit::{AuditLogRepository, AuditLogRepositoryImpl, AuditWrite};
pub use authz_audit::{AuthzAuditRepository, AuthzAuditRepositoryImpl};
pub use memory::{InMemoryAuditLogRepository, InMemoryAuthzAuditRepository};
