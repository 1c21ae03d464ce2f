//! Common test utilities
//!
//! Builds the full request pipeline on the in-memory stores, plus a small
//! order service so capture and authorization can be exercised end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Path,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use retail_authz_core::config::{
    AuditConfig, Config, DatabaseConfig, JwtConfig, TelemetryConfig,
};
use retail_authz_core::domain::{
    AssignmentStatus, AuditLogEntry, AuthorizationContext, AuthzAuditLogEntry, BranchAssignment,
    Identity, ScopeMode, StringUuid,
};
use retail_authz_core::error::{AppError, Result};
use retail_authz_core::middleware::audit_capture::{CaptureInput, EntityIdSource, SnapshotLoader};
use retail_authz_core::middleware::authorize::{ResourceResolver, RouteRequest};
use retail_authz_core::middleware::{
    audit_capture_middleware, authorize_middleware, RouteAudit, RouteAuthorization,
};
use retail_authz_core::policy::{actions, ResourceRef, Role};
use retail_authz_core::repository::{InMemoryAuditLogRepository, InMemoryAuthzAuditRepository};
use retail_authz_core::server::{build_router, protect, with_observability, AppState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

pub const BRANCH_HEADER: &str = "x-branch-id";

pub fn test_config() -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        database: DatabaseConfig {
            url: "mysql://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-for-retail-authz".to_string(),
            issuer: "retail-platform".to_string(),
            audience: "retail-api".to_string(),
            access_token_ttl_secs: 3600,
        },
        audit: AuditConfig::default(),
        telemetry: TelemetryConfig::default(),
    }
}

pub fn branch(n: u8) -> StringUuid {
    format!("00000000-0000-0000-0000-0000000001{:02}", n)
        .parse()
        .unwrap()
}

pub fn admin() -> Identity {
    Identity {
        user_id: StringUuid::new_v4(),
        role: None,
        system_roles: vec![Role::SuperAdmin],
        task_roles: vec![],
        branch_assignments: vec![],
        access_review_required: false,
    }
}

pub fn staff(branch_id: StringUuid, role: Role) -> Identity {
    Identity {
        user_id: StringUuid::new_v4(),
        role: None,
        system_roles: vec![],
        task_roles: vec![],
        branch_assignments: vec![BranchAssignment {
            branch_id,
            roles: vec![role],
            status: AssignmentStatus::Active,
        }],
        access_review_required: false,
    }
}

pub fn customer() -> Identity {
    Identity {
        user_id: StringUuid::new_v4(),
        role: None,
        system_roles: vec![Role::Customer],
        task_roles: vec![],
        branch_assignments: vec![],
        access_review_required: false,
    }
}

/// Orders keyed by id, shared by handlers, resolvers and snapshot loaders.
pub type OrderStore = Arc<RwLock<HashMap<String, Value>>>;

struct OrderSnapshot(OrderStore);

#[async_trait]
impl SnapshotLoader for OrderSnapshot {
    async fn load(&self, entity_id: &str) -> Result<Option<Value>> {
        Ok(self.0.read().await.get(entity_id).cloned())
    }
}

struct OrderBranch(OrderStore);

#[async_trait]
impl ResourceResolver for OrderBranch {
    async fn resolve(&self, request: &RouteRequest<'_>) -> Result<Option<ResourceRef>> {
        let id = request
            .path_param("id")
            .ok_or_else(|| AppError::BadRequest("order id missing".to_string()))?;
        let orders = self.0.read().await;
        let order = orders
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
        Ok(Some(ResourceRef {
            resource_type: Some("order".to_string()),
            resource_id: Some(id.to_string()),
            branch_id: order["branchId"].as_str().and_then(|b| b.parse().ok()),
            assignee_id: None,
        }))
    }
}

fn next_status(current: &str) -> Option<&'static str> {
    match current {
        "PENDING" => Some("PAID"),
        "PAID" => Some("SHIPPED"),
        "SHIPPED" => Some("DELIVERED"),
        _ => None,
    }
}

async fn create_order(
    store: OrderStore,
    context: AuthorizationContext,
    body: Value,
) -> Response {
    let id = format!("ord-{}", StringUuid::new_v4());
    let order = json!({
        "id": id,
        "status": "PENDING",
        "branchId": context.active_branch_id.map(|b| b.to_string()),
        "customer": body["customer"].clone(),
        "items": body["items"].clone(),
    });
    store.write().await.insert(id, order.clone());
    (StatusCode::CREATED, Json(json!({"success": true, "data": {"order": order}}))).into_response()
}

async fn update_status(store: OrderStore, id: String, body: Value) -> Response {
    let mut orders = store.write().await;
    let Some(order) = orders.get_mut(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"code": "ORDER_NOT_FOUND", "message": "Order not found"})),
        )
            .into_response();
    };
    let current = order["status"].as_str().unwrap_or_default().to_string();
    let requested = body["status"].as_str().unwrap_or_default();
    if next_status(&current) != Some(requested) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "INVALID_TRANSITION",
                "message": format!("{} -> {} is not allowed", current, requested),
            })),
        )
            .into_response();
    }
    order["status"] = json!(requested);
    (StatusCode::OK, Json(json!({"success": true, "data": order.clone()}))).into_response()
}

async fn payment_succeeded(store: OrderStore, body: Value) -> Response {
    let order_id = body["data"]["object"]["metadata"]["orderId"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let mut orders = store.write().await;
    let Some(order) = orders.get_mut(&order_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    order["status"] = json!("PAID");
    order["paymentRef"] = body["data"]["object"]["id"].clone();
    StatusCode::NO_CONTENT.into_response()
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub audit_repo: Arc<InMemoryAuditLogRepository>,
    pub authz_repo: Arc<InMemoryAuthzAuditRepository>,
    pub orders: OrderStore,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let audit_repo = Arc::new(InMemoryAuditLogRepository::new());
        let authz_repo = Arc::new(InMemoryAuthzAuditRepository::new());
        let state = AppState::new(config, audit_repo.clone(), authz_repo.clone());
        let orders: OrderStore = Arc::default();

        let create_store = orders.clone();
        let create = post(
            move |Extension(ctx): Extension<AuthorizationContext>, Json(body): Json<Value>| {
                create_order(create_store.clone(), ctx, body)
            },
        )
        .layer(from_fn_with_state(
            state.audit_capture(
                RouteAudit::new("ORDER_CREATE", "storefront", "order", OrderSnapshot(orders.clone()))
                    .entity_id(EntityIdSource::ResponseField("data.order.id")),
            ),
            audit_capture_middleware,
        ))
        .layer(from_fn_with_state(
            state.authorize(
                RouteAuthorization::action(actions::ORDER_CREATE)
                    .require_active_branch()
                    .resource_type("order"),
            ),
            authorize_middleware,
        ));

        let status_store = orders.clone();
        let status = post(move |Path(id): Path<String>, Json(body): Json<Value>| {
            update_status(status_store.clone(), id, body)
        })
        .layer(from_fn_with_state(
            state.audit_capture(
                RouteAudit::new(
                    "ORDER_STATUS_UPDATE",
                    "admin_api",
                    "order",
                    OrderSnapshot(orders.clone()),
                )
                .entity_id(EntityIdSource::PathParam("id")),
            ),
            audit_capture_middleware,
        ))
        .layer(from_fn_with_state(
            state.authorize(
                RouteAuthorization::action(actions::ORDER_UPDATE_STATUS)
                    .resource(OrderBranch(orders.clone()))
                    .resource_type("order"),
            ),
            authorize_middleware,
        ));

        let sales_report = get(|| async { Json(json!({"success": true, "data": []})) }).layer(
            from_fn_with_state(
                state.authorize(
                    RouteAuthorization::action(actions::REPORT_READ).scope(ScopeMode::Global),
                ),
                authorize_middleware,
            ),
        );

        let deliveries = get(|| async { Json(json!({"success": true, "data": []})) }).layer(
            from_fn_with_state(
                state.authorize(
                    RouteAuthorization::action(actions::DELIVERY_READ)
                        .require_active_branch_for(vec![ScopeMode::Branch]),
                ),
                authorize_middleware,
            ),
        );

        let business = Router::new()
            .route("/api/v1/orders", create)
            .route("/api/v1/orders/{id}/status", status)
            .route("/api/v1/reports/sales", sales_report)
            .route("/api/v1/deliveries", deliveries);

        // Payment provider callback: unauthenticated, order id only in the payload
        let webhook_store = orders.clone();
        let payment_webhook = post(move |Json(body): Json<Value>| {
            payment_succeeded(webhook_store.clone(), body)
        })
        .layer(from_fn_with_state(
            state.audit_capture(
                RouteAudit::new(
                    "PAYMENT_CAPTURED",
                    "payment_webhook",
                    "order",
                    OrderSnapshot(orders.clone()),
                )
                .entity_id(EntityIdSource::Custom(Arc::new(|input: &CaptureInput<'_>| {
                    input.request_body["data"]["object"]["metadata"]["orderId"]
                        .as_str()
                        .map(str::to_string)
                }))),
            ),
            audit_capture_middleware,
        ));
        let webhooks = Router::new().route("/api/v1/webhooks/payments", payment_webhook);

        let router = build_router(state.clone())
            .merge(with_observability(protect(business, &state)))
            .merge(with_observability(webhooks));

        Self {
            state,
            router,
            audit_repo,
            authz_repo,
            orders,
        }
    }

    pub fn token(&self, identity: &Identity) -> String {
        self.state.jwt_manager.create_access_token(identity).unwrap()
    }

    pub async fn seed_order(&self, branch_id: StringUuid, status: &str) -> String {
        let id = format!("ord-{}", StringUuid::new_v4());
        self.orders.write().await.insert(
            id.clone(),
            json!({"id": id, "status": status, "branchId": branch_id.to_string()}),
        );
        id
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Post-capture runs detached; poll until `n` entries landed.
    pub async fn wait_for_audit_entries(&self, n: usize) -> Vec<AuditLogEntry> {
        for _ in 0..100 {
            if self.audit_repo.len().await >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.audit_repo.all().await
    }

    pub async fn authz_entries(&self) -> Vec<AuthzAuditLogEntry> {
        self.authz_repo.all().await
    }
}

pub fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    branch_id: Option<StringUuid>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    if let Some(branch_id) = branch_id {
        builder = builder.header(BRANCH_HEADER, branch_id.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
