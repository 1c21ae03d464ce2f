//! Domain models for the access-control and audit core

pub mod access;
pub mod audit;
pub mod common;

pub use access::*;
pub use audit::*;
pub use common::StringUuid;
