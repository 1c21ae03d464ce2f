//! Audit reporting API integration tests

use retail_authz_core::domain::{AuditLogEntry, AuditOutcome, StringUuid};
use retail_authz_core::policy::Role;
use retail_authz_core::repository::AuditLogRepository;
use retail_authz_core::service::AuditEntryPayload;
use serde_json::json;

mod common;

use common::{admin, branch, request, staff, TestApp};

async fn seed_entry(app: &TestApp, branch_id: StringUuid, entity_id: &str) -> AuditLogEntry {
    let mut payload = AuditEntryPayload::new("order", entity_id, "ORDER_CANCEL", AuditOutcome::Success);
    payload.branch_id = Some(branch_id);
    payload.new_values = json!({"status": "CANCELLED"});
    app.state
        .audit_service
        .write_audit_entry(payload)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_admin_lists_all_branches() {
    let app = TestApp::new();
    seed_entry(&app, branch(1), "ord-a").await;
    seed_entry(&app, branch(2), "ord-b").await;
    let token = app.token(&admin());

    let (status, body) = app
        .send(request("GET", "/api/v1/audit-logs?limit=10&offset=0", Some(&token), None, None))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["per_page"], 10);
}

#[tokio::test]
async fn test_list_with_filters() {
    let app = TestApp::new();
    seed_entry(&app, branch(1), "ord-a").await;
    seed_entry(&app, branch(1), "ord-b").await;
    let token = app.token(&admin());

    let (status, body) = app
        .send(request(
            "GET",
            "/api/v1/audit-logs?entity_type=order&entity_id=ord-b&outcome=SUCCESS",
            Some(&token),
            None,
            None,
        ))
        .await;

    assert_eq!(status, 200);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["entityId"], "ord-b");
}

#[tokio::test]
async fn test_branch_manager_sees_only_active_branch() {
    let app = TestApp::new();
    seed_entry(&app, branch(1), "ord-a").await;
    seed_entry(&app, branch(2), "ord-b").await;
    let token = app.token(&staff(branch(1), Role::BranchManager));

    let (status, body) = app
        .send(request("GET", "/api/v1/audit-logs", Some(&token), None, None))
        .await;
    assert_eq!(status, 200);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["entityId"], "ord-a");

    // Asking for another branch yields nothing rather than widening the scope
    let (status, body) = app
        .send(request(
            "GET",
            &format!("/api/v1/audit-logs?branch_id={}", branch(2)),
            Some(&token),
            None,
            None,
        ))
        .await;
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_get_by_id_respects_branch() {
    let app = TestApp::new();
    let own = seed_entry(&app, branch(1), "ord-a").await;
    let other = seed_entry(&app, branch(2), "ord-b").await;
    let token = app.token(&staff(branch(1), Role::BranchManager));

    let (status, body) = app
        .send(request("GET", &format!("/api/v1/audit-logs/{}", own.id), Some(&token), None, None))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["entityId"], "ord-a");

    let (status, _) = app
        .send(request("GET", &format!("/api/v1/audit-logs/{}", other.id), Some(&token), None, None))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_cashier_cannot_read_audit_logs() {
    let app = TestApp::new();
    let token = app.token(&staff(branch(1), Role::Cashier));

    let (status, body) = app
        .send(request("GET", "/api/v1/audit-logs", Some(&token), None, None))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_ACTION_DENIED");
}

#[tokio::test]
async fn test_authz_audit_logs_list_denials() {
    let app = TestApp::new();
    let cashier = app.token(&staff(branch(1), Role::Cashier));
    let (status, _) = app
        .send(request("GET", "/api/v1/reports/sales", Some(&cashier), None, None))
        .await;
    assert_eq!(status, 403);

    let token = app.token(&admin());
    let (status, body) = app
        .send(request(
            "GET",
            "/api/v1/authz-audit-logs?decision=DENY",
            Some(&token),
            None,
            None,
        ))
        .await;

    assert_eq!(status, 200);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["reasonCode"], "AUTHZ_ACTION_DENIED");
}

#[tokio::test]
async fn test_audit_trail_is_append_only() {
    let app = TestApp::new();
    let entry = seed_entry(&app, branch(1), "ord-a").await;
    let repo = app.audit_repo.clone();

    let err = repo
        .update(entry.id, json!({"note": "tampered"}))
        .await
        .unwrap_err();
    assert!(err.is_append_only_violation());
    assert!(repo.delete(entry.id).await.unwrap_err().is_append_only_violation());
    assert!(repo.insert(entry.clone()).await.unwrap_err().is_append_only_violation());

    let stored = repo.find_by_id(entry.id).await.unwrap().unwrap();
    assert_eq!(stored, entry);
    assert_eq!(repo.len().await, 1);
}
