//! Audit capture around mutating routes.
//!
//! Before the handler runs the middleware resolves the target entity and
//! snapshots it. Request and response bodies up to `max_body_bytes` are
//! buffered so they can be inspected, then handed on unchanged; larger or
//! broken bodies are streamed through and captured as absent. Post-capture (second snapshot, diff, write) runs
//! as a detached task and never affects the response.
//!
//! A [`CaptureGuard`] is armed for every request that enters the middleware.
//! It is either finished with the realized response or, if the request
//! future is dropped first, fires an aborted capture from `Drop`. Either way
//! post-capture runs exactly once.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request},
    middleware::Next,
    response::Response,
};
use futures_util::{future, stream, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::audit::compute_audit_diff;
use crate::domain::{
    ActorType, AuditActor, AuditOutcome, AuthorizationContext, FailureContext, RequestContext,
    StringUuid,
};
use crate::error::Result;
use crate::middleware::data_scope::{DataScope, DATA_SCOPE};
use crate::service::{AuditEntryPayload, AuditService};
use crate::telemetry::metrics as telemetry_metrics;

/// Status recorded when the client went away before the handler finished.
pub const ABORTED_STATUS: u16 = 499;
pub const REQUEST_ABORTED: &str = "REQUEST_ABORTED";

/// Read-only view of the request (and, after the handler, the response)
/// handed to id and metadata resolvers.
pub struct CaptureInput<'a> {
    pub method: &'a Method,
    pub path_params: &'a HashMap<String, String>,
    pub query: &'a HashMap<String, String>,
    pub request_body: &'a Value,
    /// `None` before the handler has run.
    pub response_body: Option<&'a Value>,
    pub status: Option<u16>,
}

pub type EntityIdFn = Arc<dyn Fn(&CaptureInput<'_>) -> Option<String> + Send + Sync>;
pub type MetadataFn = Arc<dyn Fn(&CaptureInput<'_>) -> Option<Value> + Send + Sync>;

/// Where to look for the target entity id. Sources are tried in order.
#[derive(Clone)]
pub enum EntityIdSource {
    PathParam(&'static str),
    QueryParam(&'static str),
    /// Dotted path into the JSON request body.
    BodyField(&'static str),
    /// Dotted path into the JSON response body.
    ResponseField(&'static str),
    /// Payload-specific extractor, e.g. for asynchronous callbacks.
    Custom(EntityIdFn),
}

impl EntityIdSource {
    fn resolve(&self, input: &CaptureInput<'_>) -> Option<String> {
        let id = match self {
            EntityIdSource::PathParam(name) => input.path_params.get(*name).cloned(),
            EntityIdSource::QueryParam(name) => input.query.get(*name).cloned(),
            EntityIdSource::BodyField(path) => lookup(input.request_body, path).and_then(id_string),
            EntityIdSource::ResponseField(path) => input
                .response_body
                .and_then(|body| lookup(body, path))
                .and_then(id_string),
            EntityIdSource::Custom(resolve) => resolve(input),
        };
        id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
    }
}

fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Loads the current state of an entity. `Ok(None)` means it does not exist.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    async fn load(&self, entity_id: &str) -> Result<Option<Value>>;
}

/// Audit declaration for one route.
#[derive(Clone)]
pub struct RouteAudit {
    action_type: &'static str,
    source: &'static str,
    entity_type: &'static str,
    id_sources: Vec<EntityIdSource>,
    snapshot: Arc<dyn SnapshotLoader>,
    metadata: Option<MetadataFn>,
}

impl RouteAudit {
    pub fn new<L: SnapshotLoader + 'static>(
        action_type: &'static str,
        source: &'static str,
        entity_type: &'static str,
        snapshot: L,
    ) -> Self {
        Self {
            action_type,
            source,
            entity_type,
            id_sources: Vec::new(),
            snapshot: Arc::new(snapshot),
            metadata: None,
        }
    }

    pub fn entity_id(mut self, source: EntityIdSource) -> Self {
        self.id_sources.push(source);
        self
    }

    pub fn metadata<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&CaptureInput<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.metadata = Some(Arc::new(resolve));
        self
    }

    fn resolve_entity_id(&self, input: &CaptureInput<'_>) -> Option<String> {
        self.id_sources.iter().find_map(|source| source.resolve(input))
    }

    async fn snapshot(&self, entity_id: &str) -> Option<Value> {
        match self.snapshot.load(entity_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    entity_type = self.entity_type,
                    entity_id,
                    "Audit snapshot failed"
                );
                None
            }
        }
    }
}

/// Shared state for audit capture middleware
#[derive(Clone)]
pub struct AuditCaptureState {
    route: Arc<RouteAudit>,
    audit: Arc<AuditService>,
    max_body_bytes: usize,
}

impl AuditCaptureState {
    pub fn new(route: RouteAudit, audit: Arc<AuditService>, max_body_bytes: usize) -> Self {
        Self {
            route: Arc::new(route),
            audit,
            max_body_bytes,
        }
    }
}

/// How the request ended.
struct Completion {
    status: u16,
    response_body: Option<Value>,
}

impl Completion {
    fn aborted() -> Self {
        Self {
            status: ABORTED_STATUS,
            response_body: Some(json!({
                "code": REQUEST_ABORTED,
                "message": "Request aborted before the handler completed",
            })),
        }
    }
}

/// Everything captured before the handler ran.
struct PendingCapture {
    state: AuditCaptureState,
    method: Method,
    path_params: HashMap<String, String>,
    query: HashMap<String, String>,
    request_body: Value,
    context: Option<AuthorizationContext>,
    /// Row scope of the request, re-entered for the post-snapshot.
    scope: Option<DataScope>,
    request_context: RequestContext,
    entity_id: Option<String>,
    before: Option<Value>,
}

impl PendingCapture {
    fn spawn(self, completion: Completion) {
        let span = tracing::info_span!(
            "audit_capture",
            action_type = self.state.route.action_type,
            request_id = ?self.request_context.request_id,
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let scope = self.scope;
                let task = async move {
                    match scope {
                        Some(scope) => DATA_SCOPE.scope(scope, self.run(completion)).await,
                        None => self.run(completion).await,
                    }
                };
                handle.spawn(task.instrument(span));
            }
            Err(_) => {
                telemetry_metrics::record_capture_skipped("no_runtime");
                tracing::warn!(
                    action_type = self.state.route.action_type,
                    "Audit capture dropped outside a runtime"
                );
            }
        }
    }

    async fn run(self, completion: Completion) {
        let route = &self.state.route;
        let input = CaptureInput {
            method: &self.method,
            path_params: &self.path_params,
            query: &self.query,
            request_body: &self.request_body,
            response_body: completion.response_body.as_ref(),
            status: Some(completion.status),
        };

        let Some(entity_id) = self.entity_id.clone().or_else(|| route.resolve_entity_id(&input))
        else {
            telemetry_metrics::record_capture_skipped("no_entity_id");
            tracing::debug!(entity_type = route.entity_type, "No entity id resolved, audit skipped");
            return;
        };

        let before = self.before.clone().unwrap_or_else(empty_object);
        let after = route.snapshot(&entity_id).await.unwrap_or_else(empty_object);
        let outcome = AuditOutcome::from_status(completion.status);
        let diff = compute_audit_diff(&before, &after);

        let mut payload =
            AuditEntryPayload::new(route.entity_type, &entity_id, route.action_type, outcome);
        payload.source = Some(route.source.to_string());
        payload.actor = self.context.as_ref().map(|ctx| AuditActor {
            actor_type: ActorType::User,
            user_id: Some(ctx.actor_id),
            role: ctx.primary_role(),
            source: route.source.to_string(),
        });
        payload.order_id = if route.entity_type == "order" {
            Some(entity_id.clone())
        } else {
            string_field(&after, "orderId").or_else(|| string_field(&before, "orderId"))
        };
        payload.branch_id = string_field(&after, "branchId")
            .or_else(|| string_field(&before, "branchId"))
            .and_then(|b| StringUuid::parse_str(&b).ok())
            .or_else(|| self.context.as_ref().and_then(|ctx| ctx.active_branch_id));
        payload.note = string_field(&self.request_body, "note");
        payload.reason = string_field(&self.request_body, "reason");
        payload.request_context = Some(self.request_context.clone());
        payload.metadata = self.metadata(&input);

        match outcome {
            AuditOutcome::Success => {
                payload.old_values = diff.old_values;
                payload.new_values = diff.new_values;
            }
            // A failed request usually changes nothing; keep both states so
            // the record shows what the request ran against.
            AuditOutcome::Failed => {
                let body = completion.response_body.as_ref();
                payload.failure_context = Some(FailureContext {
                    http_status: completion.status,
                    error_code: body
                        .and_then(|b| string_field(b, "code").or_else(|| string_field(b, "error"))),
                    error_message: body.and_then(|b| string_field(b, "message")),
                });
                payload.old_values = before;
                payload.new_values = after;
            }
        }
        payload.changed_paths = diff.changed_paths;

        self.state.audit.safe_write_audit_entry(payload).await;
    }

    fn metadata(&self, input: &CaptureInput<'_>) -> Value {
        let mut metadata = match self.state.route.metadata.as_ref().and_then(|f| f(input)) {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => Map::new(),
        };
        if let Some(ctx) = self.context.as_ref().filter(|ctx| ctx.is_simulated()) {
            if let Some(branch) = ctx.simulated_branch_id {
                metadata.insert("simulatedBranchId".to_string(), json!(branch.to_string()));
            }
        }
        Value::Object(metadata)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fires post-capture exactly once: through [`finish`](Self::finish), or
/// from `Drop` as an aborted request.
struct CaptureGuard {
    pending: Option<PendingCapture>,
}

impl CaptureGuard {
    fn arm(pending: PendingCapture) -> Self {
        Self {
            pending: Some(pending),
        }
    }

    fn finish(mut self, completion: Completion) {
        if let Some(pending) = self.pending.take() {
            pending.spawn(completion);
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::info!(
                action_type = pending.state.route.action_type,
                "Request aborted, recording audit capture"
            );
            pending.spawn(Completion::aborted());
        }
    }
}

/// Result of reading a body for capture.
enum BufferedBody {
    Complete(Bytes),
    /// Over the limit. Rebuilt from the chunks already read plus the rest
    /// of the stream, so the consumer sees the original bytes.
    Oversized(Body),
    /// Failed mid-stream. Rebuilt the same way, ending with the error.
    Broken(Body),
}

async fn buffer_body(body: Body, limit: usize) -> BufferedBody {
    let mut rest = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0usize;

    while let Some(next) = rest.next().await {
        match next {
            Ok(chunk) => {
                read += chunk.len();
                chunks.push(chunk);
                if read > limit {
                    let replay = stream::iter(chunks.into_iter().map(Ok)).chain(rest);
                    return BufferedBody::Oversized(Body::from_stream(replay));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Body stream failed during audit capture");
                let replay = stream::iter(chunks.into_iter().map(Ok))
                    .chain(stream::once(future::ready(Err::<Bytes, _>(e))));
                return BufferedBody::Broken(Body::from_stream(replay));
            }
        }
    }

    BufferedBody::Complete(match chunks.len() {
        1 => chunks.remove(0),
        _ => Bytes::from(chunks.concat()),
    })
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

pub async fn audit_capture_middleware(
    State(state): State<AuditCaptureState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let (request_body, body) = match buffer_body(body, state.max_body_bytes).await {
        BufferedBody::Complete(bytes) => (
            serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            Body::from(bytes),
        ),
        BufferedBody::Oversized(body) => {
            telemetry_metrics::record_capture_skipped("request_body_too_large");
            (Value::Null, body)
        }
        BufferedBody::Broken(body) => {
            telemetry_metrics::record_capture_skipped("request_body_unreadable");
            (Value::Null, body)
        }
    };

    let path_params = super::path_params(&mut parts).await;
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|q| q.0)
        .unwrap_or_default();

    let entity_id = {
        let input = CaptureInput {
            method: &parts.method,
            path_params: &path_params,
            query: &query,
            request_body: &request_body,
            response_body: None,
            status: None,
        };
        state.route.resolve_entity_id(&input)
    };
    let before = match &entity_id {
        Some(id) => state.route.snapshot(id).await,
        None => None,
    };

    let guard = CaptureGuard::arm(PendingCapture {
        state: state.clone(),
        method: parts.method.clone(),
        context: parts.extensions.get::<AuthorizationContext>().cloned(),
        scope: DataScope::current(),
        request_context: super::request_context(&parts),
        path_params,
        query,
        request_body,
        entity_id,
        before,
    });

    let response = next.run(Request::from_parts(parts, body)).await;

    let status = response.status().as_u16();
    if is_event_stream(response.headers()) {
        guard.finish(Completion {
            status,
            response_body: None,
        });
        return response;
    }

    let (response_parts, response_body) = response.into_parts();
    match buffer_body(response_body, state.max_body_bytes).await {
        BufferedBody::Complete(bytes) => {
            guard.finish(Completion {
                status,
                response_body: serde_json::from_slice(&bytes).ok(),
            });
            Response::from_parts(response_parts, Body::from(bytes))
        }
        BufferedBody::Oversized(body) | BufferedBody::Broken(body) => {
            guard.finish(Completion {
                status,
                response_body: None,
            });
            Response::from_parts(response_parts, body)
        }
    }
}
