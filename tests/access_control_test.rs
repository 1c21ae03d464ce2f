//! Access-context and authorization integration tests

use retail_authz_core::domain::{AuthzDecision, Identity, ScopeMode, StringUuid};
use retail_authz_core::policy::Role;
use serde_json::json;

mod common;

use common::{admin, branch, customer, request, staff, TestApp};

#[tokio::test]
async fn test_missing_token_is_401_and_not_an_authz_decision() {
    let app = TestApp::new();

    let (status, body) = app
        .send(request("GET", "/api/v1/reports/sales", None, None, None))
        .await;

    assert_eq!(status, 401);
    assert_eq!(body["code"], "AUTH_REQUIRED");
    assert!(app.authz_entries().await.is_empty());
}

#[tokio::test]
async fn test_invalid_token_is_401() {
    let app = TestApp::new();

    let (status, body) = app
        .send(request("GET", "/api/v1/reports/sales", Some("not-a-jwt"), None, None))
        .await;

    assert_eq!(status, 401);
    assert_eq!(body["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
async fn test_branch_switch_denied_for_fixed_branch_staff() {
    let app = TestApp::new();
    let cashier = staff(branch(1), Role::Cashier);
    let token = app.token(&cashier);

    let (status, body) = app
        .send(request(
            "POST",
            "/api/v1/orders",
            Some(&token),
            Some(branch(2)),
            Some(json!({"items": []})),
        ))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "AUTHZ_BRANCH_SWITCH_FORBIDDEN");

    let decisions = app.authz_entries().await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision, AuthzDecision::Deny);
    assert_eq!(decisions[0].reason_code, "AUTHZ_BRANCH_SWITCH_FORBIDDEN");
    assert_eq!(decisions[0].actor_id, Some(cashier.user_id));

    // Denied before the handler: no order, no business audit entry
    assert!(app.orders.read().await.is_empty());
    assert!(app.audit_repo.is_empty().await);
}

#[tokio::test]
async fn test_admin_global_scope_allowed_and_recorded() {
    let app = TestApp::new();
    let token = app.token(&admin());

    let (status, _) = app
        .send(request("GET", "/api/v1/reports/sales", Some(&token), None, None))
        .await;
    assert_eq!(status, 200);

    let decisions = app.authz_entries().await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision, AuthzDecision::Allow);
    assert_eq!(decisions[0].reason_code, "AUTHZ_ALLOWED");
    assert_eq!(decisions[0].scope_mode, Some(ScopeMode::Global));
    assert_eq!(decisions[0].action.as_deref(), Some("report.read"));
}

#[tokio::test]
async fn test_staff_global_scope_denied() {
    let app = TestApp::new();
    let token = app.token(&staff(branch(1), Role::BranchManager));

    let (status, body) = app
        .send(request("GET", "/api/v1/reports/sales", Some(&token), None, None))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_GLOBAL_SCOPE_DENIED");

    let decisions = app.authz_entries().await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision, AuthzDecision::Deny);
    assert_eq!(decisions[0].active_branch_id, Some(branch(1)));
}

#[tokio::test]
async fn test_resource_in_other_branch_forbidden() {
    let app = TestApp::new();
    let order_id = app.seed_order(branch(2), "PENDING").await;
    let token = app.token(&staff(branch(1), Role::Cashier));

    let (status, body) = app
        .send(request(
            "POST",
            &format!("/api/v1/orders/{}/status", order_id),
            Some(&token),
            None,
            Some(json!({"status": "PAID"})),
        ))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_BRANCH_FORBIDDEN");
    assert_eq!(app.orders.read().await[&order_id]["status"], "PENDING");

    let decisions = app.authz_entries().await;
    assert_eq!(decisions[0].resource_id.as_deref(), Some(order_id.as_str()));
}

#[tokio::test]
async fn test_role_without_action_denied() {
    let app = TestApp::new();
    let order_id = app.seed_order(branch(1), "PENDING").await;
    let token = app.token(&staff(branch(1), Role::InventoryClerk));

    let (status, body) = app
        .send(request(
            "POST",
            &format!("/api/v1/orders/{}/status", order_id),
            Some(&token),
            None,
            Some(json!({"status": "PAID"})),
        ))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_ACTION_DENIED");
}

#[tokio::test]
async fn test_access_review_blocks_every_request() {
    let app = TestApp::new();
    let mut manager = staff(branch(1), Role::BranchManager);
    manager.access_review_required = true;
    let token = app.token(&manager);

    let (status, body) = app
        .send(request(
            "POST",
            "/api/v1/orders",
            Some(&token),
            None,
            Some(json!({"items": []})),
        ))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_ACCESS_REVIEW_REQUIRED");
}

#[tokio::test]
async fn test_simulation_requires_global_admin() {
    let app = TestApp::new();
    let token = app.token(&staff(branch(1), Role::BranchManager));

    let mut req = request("GET", "/api/v1/reports/sales", Some(&token), None, None);
    req.headers_mut()
        .insert("x-simulate-branch-id", branch(2).to_string().parse().unwrap());
    let (status, body) = app.send(req).await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_SIMULATION_FORBIDDEN");
}

#[tokio::test]
async fn test_customer_orders_in_selected_branch() {
    let app = TestApp::new();
    let token = app.token(&customer());

    let (status, body) = app
        .send(request(
            "POST",
            "/api/v1/orders",
            Some(&token),
            Some(branch(3)),
            Some(json!({"items": [{"sku": "TEA-01", "qty": 2}]})),
        ))
        .await;

    assert_eq!(status, 201);
    assert_eq!(body["data"]["order"]["branchId"], branch(3).to_string());
}

#[tokio::test]
async fn test_customer_without_branch_cannot_order() {
    let app = TestApp::new();
    let token = app.token(&customer());

    let (status, body) = app
        .send(request(
            "POST",
            "/api/v1/orders",
            Some(&token),
            None,
            Some(json!({"items": []})),
        ))
        .await;

    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_ACTIVE_BRANCH_REQUIRED");
}

#[tokio::test]
async fn test_unknown_order_is_404_from_resolver() {
    let app = TestApp::new();
    let token = app.token(&admin());

    let (status, _) = app
        .send(request(
            "POST",
            "/api/v1/orders/ord-missing/status",
            Some(&token),
            None,
            Some(json!({"status": "PAID"})),
        ))
        .await;

    assert_eq!(status, 404);
}

fn driver() -> Identity {
    Identity {
        user_id: StringUuid::new_v4(),
        role: None,
        system_roles: vec![],
        task_roles: vec![Role::DeliveryDriver],
        branch_assignments: vec![],
        access_review_required: false,
    }
}

#[tokio::test]
async fn test_active_branch_required_only_in_branch_mode() {
    let app = TestApp::new();

    // Task-only driver resolves to branch mode without an active branch
    let token = app.token(&driver());
    let (status, body) = app
        .send(request("GET", "/api/v1/deliveries", Some(&token), None, None))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], "AUTHZ_ACTIVE_BRANCH_REQUIRED");

    // Global admin runs in global mode, where no branch is needed
    let token = app.token(&admin());
    let (status, _) = app
        .send(request("GET", "/api/v1/deliveries", Some(&token), None, None))
        .await;
    assert_eq!(status, 200);

    let token = app.token(&staff(branch(1), Role::BranchManager));
    let (status, _) = app
        .send(request("GET", "/api/v1/deliveries", Some(&token), None, None))
        .await;
    assert_eq!(status, 200);
}
