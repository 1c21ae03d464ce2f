//! Pure audit helpers: snapshot diffing and sensitive-field masking

pub mod diff;
pub mod mask;

pub use diff::{compute_audit_diff, flatten, AuditDiff};
pub use mask::{mask_sensitive_data, MASK_SENTINEL};
