//! Retail Authz Core - branch-scoped access control and audit trail
//!
//! Resolves who is acting and in which branch, decides whether an action is
//! allowed, and keeps an append-only record of business changes and
//! authorization decisions.

pub mod api;
pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod repository;
pub mod server;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
