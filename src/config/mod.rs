//! Configuration management for the retail access-control core

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Audit trail configuration
    pub audit: AuditConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
}

/// Audit trail configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Global switch for business audit entries. Disabled only for trusted
    /// bulk-migration runs.
    pub enabled: bool,
    /// Whether ALLOW decisions are recorded by default (DENY always is)
    pub log_allow_decisions: bool,
    /// Maximum request/response body size buffered by audit capture
    pub max_body_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_allow_decisions: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: false,
            service_name: "retail-authz-core".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "retail-platform".to_string()),
                audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "retail-api".to_string()),
                access_token_ttl_secs: env::var("JWT_ACCESS_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
            audit: {
                let defaults = AuditConfig::default();
                AuditConfig {
                    enabled: parse_bool_env("AUDIT_ENABLED", defaults.enabled),
                    log_allow_decisions: parse_bool_env(
                        "AUDIT_LOG_ALLOW_DECISIONS",
                        defaults.log_allow_decisions,
                    ),
                    max_body_bytes: env::var("AUDIT_MAX_BODY_BYTES")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(defaults.max_body_bytes),
                }
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
                metrics_enabled: parse_bool_env("METRICS_ENABLED", false),
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "retail-authz-core".to_string()),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| parse_bool(&v, default))
        .unwrap_or(default)
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            database: DatabaseConfig {
                url: "mysql://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: "retail-platform".to_string(),
                audience: "retail-api".to_string(),
                access_token_ttl_secs: 3600,
            },
            audit: AuditConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    #[test]
    fn test_http_addr() {
        assert_eq!(test_config().http_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_audit_defaults() {
        let audit = AuditConfig::default();
        assert!(audit.enabled);
        assert!(audit.log_allow_decisions);
        assert_eq!(audit.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool(" yes ", false));
        assert!(!parse_bool("off", true));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("", false));
    }
}
