//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::middleware::{
    access_context_middleware, authorize_middleware, inject_client_ip, require_auth_middleware,
    trace::SanitizedMakeSpan, AccessContextState, AuditCaptureState, AuthMiddlewareState,
    AuthorizeState, ObservabilityLayer, RouteAudit, RouteAuthorization,
};
use crate::policy::actions;
use crate::repository::{
    AuditLogRepository, AuditLogRepositoryImpl, AuthzAuditRepository, AuthzAuditRepositoryImpl,
    InMemoryAuditLogRepository, InMemoryAuthzAuditRepository,
};
use crate::service::{AuditService, AuthzAuditService};
use anyhow::{Context, Result};
use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when running on the in-memory stores
    pub db_pool: Option<MySqlPool>,
    pub audit_repo: Arc<dyn AuditLogRepository>,
    pub authz_audit_repo: Arc<dyn AuthzAuditRepository>,
    pub audit_service: Arc<AuditService>,
    pub authz_audit: AuthzAuditService,
    pub jwt_manager: JwtManager,
    pub prometheus: Arc<Option<PrometheusHandle>>,
}

impl AppState {
    pub fn new(
        config: Config,
        audit_repo: Arc<dyn AuditLogRepository>,
        authz_audit_repo: Arc<dyn AuthzAuditRepository>,
    ) -> Self {
        let audit_service = Arc::new(AuditService::new(audit_repo.clone(), config.audit.enabled));
        let authz_audit =
            AuthzAuditService::new(authz_audit_repo.clone(), config.audit.log_allow_decisions);
        let jwt_manager = JwtManager::new(config.jwt.clone());

        Self {
            config: Arc::new(config),
            db_pool: None,
            audit_repo,
            authz_audit_repo,
            audit_service,
            authz_audit,
            jwt_manager,
            prometheus: Arc::new(None),
        }
    }

    /// State backed by MySQL repositories.
    pub fn mysql(config: Config, pool: MySqlPool) -> Self {
        let mut state = Self::new(
            config,
            Arc::new(AuditLogRepositoryImpl::new(pool.clone())),
            Arc::new(AuthzAuditRepositoryImpl::new(pool.clone())),
        );
        state.db_pool = Some(pool);
        state
    }

    /// State backed by in-memory repositories, for tests and local runs.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryAuditLogRepository::new()),
            Arc::new(InMemoryAuthzAuditRepository::new()),
        )
    }

    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = Arc::new(handle);
        self
    }

    /// Middleware state for one route's authorization declaration.
    pub fn authorize(&self, route: RouteAuthorization) -> AuthorizeState {
        AuthorizeState::new(route, self.authz_audit.clone())
    }

    /// Middleware state for one route's audit declaration.
    pub fn audit_capture(&self, route: RouteAudit) -> AuditCaptureState {
        AuditCaptureState::new(
            route,
            self.audit_service.clone(),
            self.config.audit.max_body_bytes,
        )
    }
}

/// Put `routes` behind authentication and access-context resolution.
///
/// Authentication runs first; every handler and per-route layer inside sees
/// `Identity`, `AuthorizationContext` and the task-local `DataScope`.
pub fn protect(routes: Router, state: &AppState) -> Router {
    routes
        .layer(from_fn_with_state(
            AccessContextState::new(state.authz_audit.clone()),
            access_context_middleware,
        ))
        .layer(from_fn_with_state(
            AuthMiddlewareState::new(state.jwt_manager.clone()),
            require_auth_middleware,
        ))
}

/// Outer layers shared by every route: request id and metrics, client IP,
/// CORS and request tracing.
pub fn with_observability(app: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(TraceLayer::new_for_http().make_span_with(SanitizedMakeSpan))
        .layer(cors)
        .layer(from_fn(inject_client_ip))
        .layer(ObservabilityLayer)
}

/// Build the HTTP router: health endpoints plus the audit reporting API.
pub fn build_router(state: AppState) -> Router {
    let audit_read = state.authorize(RouteAuthorization::action(actions::AUDIT_READ));

    let reports = Router::new()
        .route("/api/v1/audit-logs", get(api::audit::list_audit_logs))
        .route("/api/v1/audit-logs/{id}", get(api::audit::get_audit_log))
        .route(
            "/api/v1/authz-audit-logs",
            get(api::audit::list_authz_audit_logs),
        )
        .route_layer(from_fn_with_state(audit_read, authorize_middleware))
        .with_state(state.clone());

    let app = Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        .route("/metrics", get(api::health::metrics))
        .with_state(state.clone())
        .merge(protect(reports, &state));

    with_observability(app)
}

pub async fn run(config: Config, prometheus: Option<PrometheusHandle>) -> Result<()> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database");

    let http_addr = config.http_addr();
    let state = AppState::mysql(config, db_pool).with_prometheus(prometheus);
    let app = build_router(state);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
