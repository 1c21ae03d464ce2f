//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const HTTP_REQUESTS_TOTAL: &str = "retail_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "retail_http_request_duration_seconds";
pub const HTTP_REQUESTS_IN_FLIGHT: &str = "retail_http_requests_in_flight";
pub const AUTHZ_DECISIONS_TOTAL: &str = "retail_authz_decisions_total";
pub const AUDIT_ENTRIES_TOTAL: &str = "retail_audit_entries_total";
pub const AUDIT_WRITE_FAILURES_TOTAL: &str = "retail_audit_write_failures_total";
pub const AUDIT_CAPTURE_SKIPPED_TOTAL: &str = "retail_audit_capture_skipped_total";
pub const APPEND_ONLY_VIOLATIONS_TOTAL: &str = "retail_append_only_violations_total";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let buckets = vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()?;
    Ok(handle)
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup (not just after first use).
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
    describe_histogram!(HTTP_REQUEST_DURATION, "HTTP request duration in seconds");
    describe_gauge!(
        HTTP_REQUESTS_IN_FLIGHT,
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(
        AUTHZ_DECISIONS_TOTAL,
        "Authorization decisions by decision and reason code"
    );
    describe_counter!(AUDIT_ENTRIES_TOTAL, "Audit entries written by outcome");
    describe_counter!(
        AUDIT_WRITE_FAILURES_TOTAL,
        "Audit entries that could not be persisted"
    );
    describe_counter!(
        AUDIT_CAPTURE_SKIPPED_TOTAL,
        "Audit captures that produced no entry, by reason"
    );
    describe_counter!(
        APPEND_ONLY_VIOLATIONS_TOTAL,
        "Rejected mutation attempts against append-only tables"
    );

    counter!(AUTHZ_DECISIONS_TOTAL, "decision" => "DENY", "code" => "AUTHZ_ACTION_DENIED")
        .absolute(0);
    counter!(AUDIT_ENTRIES_TOTAL, "outcome" => "SUCCESS").absolute(0);
    counter!(AUDIT_ENTRIES_TOTAL, "outcome" => "FAILED").absolute(0);
    counter!(AUDIT_WRITE_FAILURES_TOTAL).absolute(0);
    counter!(AUDIT_CAPTURE_SKIPPED_TOTAL, "reason" => "no_entity_id").absolute(0);
    gauge!(HTTP_REQUESTS_IN_FLIGHT).set(0.0);
}

pub fn record_authz_decision(decision: &'static str, code: &'static str) {
    counter!(AUTHZ_DECISIONS_TOTAL, "decision" => decision, "code" => code).increment(1);
}

pub fn record_audit_entry(outcome: &'static str) {
    counter!(AUDIT_ENTRIES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_audit_write_failure() {
    counter!(AUDIT_WRITE_FAILURES_TOTAL).increment(1);
}

pub fn record_capture_skipped(reason: &'static str) {
    counter!(AUDIT_CAPTURE_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_append_only_violation(table: &'static str, operation: &'static str) {
    counter!(APPEND_ONLY_VIOLATIONS_TOTAL, "table" => table, "operation" => operation)
        .increment(1);
}
