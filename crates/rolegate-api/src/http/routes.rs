//! HTTP route definitions and handlers.
//!
//! Caller identity and tenant come from headers set by the authenticating
//! proxy in front of the service. Every gated handler passes its JSON body
//! to the permission gate as the operation's arguments, so the resource is
//! always read from the body's `context` field.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error};

use rolegate_domain::model::{AccountInfo, ResourceContext, TenantContext};
use rolegate_domain::traits::{PolicyEngine, WorkspaceClient};
use rolegate_server::deadline::within;
use rolegate_server::{
    GateError, IdentityToken, RequestContext, RoleAssignmentResult, RoleChange, RoleDiff,
    RoleError, RoleInvite, RoleRemovalResult, UserRoles,
};

use super::state::AppState;
use crate::errors::{error_codes, ApiError, HandlerError};
use crate::observability::{metrics_handler, MetricsState};

/// Header carrying the caller's validated email.
pub const USER_MAIL_HEADER: &str = "x-user-mail";

/// Header carrying the caller's organization.
pub const ORGANIZATION_HEADER: &str = "x-organization";

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// JSON extractor answering 400 instead of 422 on malformed bodies.
///
/// Preserves 413 for bodies over the size limit.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                let status = match &rejection {
                    JsonRejection::BytesRejection(_)
                        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE =>
                    {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    error_codes::VALIDATION_ERROR
                };
                Err((status, Json(ApiError::new(code, rejection.body_text()))))
            }
        }
    }
}

fn api_routes<E: PolicyEngine, W: WorkspaceClient>() -> Router<Arc<AppState<E, W>>> {
    Router::new()
        .route("/v1/authorize", post(authorize::<E, W>))
        .route("/v1/roles/assign", post(assign_roles::<E, W>))
        .route("/v1/roles/remove", post(remove_role::<E, W>))
        .route("/v1/roles/reconcile", post(reconcile_roles::<E, W>))
        .route("/v1/roles/members", post(list_members::<E, W>))
        .route("/ready", get(readiness_check::<E, W>))
}

/// Creates the router with the API, health and readiness endpoints.
pub fn create_router<E: PolicyEngine, W: WorkspaceClient>(state: AppState<E, W>) -> Router {
    api_routes::<E, W>()
        .route("/health", get(health_check))
        .with_state(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
}

/// Creates the router plus the Prometheus endpoint at `metrics_path`.
pub fn create_router_with_observability<E: PolicyEngine, W: WorkspaceClient>(
    state: AppState<E, W>,
    metrics_state: MetricsState,
    metrics_path: &str,
) -> Router {
    let metrics_router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .with_state(metrics_state);
    create_router(state).merge(metrics_router)
}

// ============================================================
// Request context
// ============================================================

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds the gate's request context from the proxy headers.
fn request_context(headers: &HeaderMap, timeout: Duration) -> RequestContext {
    let mut ctx = RequestContext::new().with_timeout(timeout);
    if let Some(mail) = header_value(headers, USER_MAIL_HEADER) {
        ctx = ctx.with_token(IdentityToken::new(mail));
    }
    if let Some(org) = header_value(headers, ORGANIZATION_HEADER) {
        ctx = ctx.with_tenant(TenantContext::new(org));
    }
    ctx
}

fn tenant_of(ctx: &RequestContext) -> Result<TenantContext, HandlerError> {
    Ok(ctx.tenant.clone().ok_or(GateError::TenantContextMissing)?)
}

fn parse_body<T: DeserializeOwned>(body: &Value) -> Result<T, HandlerError> {
    serde_json::from_value(body.clone()).map_err(|e| HandlerError::BadRequest(e.to_string()))
}

fn respond<T: Serialize, E, W>(
    state: &AppState<E, W>,
    route: &'static str,
    result: Result<T, HandlerError>,
) -> Response {
    let response = match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            if e.is_expected() {
                debug!(route, error = %e, "request rejected");
            } else {
                error!(route, error = %e, "request failed");
            }
            e.classify(&state.errors).into_response()
        }
    };
    crate::observability::record_http_request(route, response.status().as_u16());
    response
}

// ============================================================
// Handlers
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub allowed: bool,
    pub account: Option<AccountInfo>,
}

/// Runs the gate for `{ "context": ..., "permission": ... }`.
async fn authorize<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<Value>,
) -> Response {
    let result = async {
        let permission = body
            .get("permission")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| HandlerError::BadRequest("missing field `permission`".to_string()))?;
        let ctx = request_context(&headers, state.request_timeout);
        let ctx = state.gate.check(ctx, &body, permission).await?;
        Ok::<_, HandlerError>(AuthorizeResponse {
            allowed: true,
            account: ctx.account_info,
        })
    }
    .await;
    respond(&state, "authorize", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRolesBody {
    context: ResourceContext,
    #[serde(default)]
    changes: Vec<RoleChange>,
    #[serde(default)]
    invites: Vec<RoleInvite>,
}

async fn assign_roles<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<Value>,
) -> Response {
    let parsed = parse_body::<AssignRolesBody>(&body);
    let ctx = request_context(&headers, state.request_timeout);
    let app = &*state;

    let result: Result<RoleAssignmentResult, HandlerError> = app
        .gate
        .authorize(ctx, &body, &app.manage_permission, |ctx| async move {
            let request = parsed?;
            let tenant = tenant_of(&ctx)?;
            let op = app
                .roles
                .assign_roles(&tenant, &request.context, &request.changes, &request.invites);
            let outcome = within(ctx.deadline, op)
                .await
                .map_err(|_| RoleError::DeadlineExceeded)??;
            Ok::<_, HandlerError>(outcome)
        })
        .await;
    respond(app, "assign_roles", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveRoleBody {
    context: ResourceContext,
    user_id: String,
    role: String,
}

async fn remove_role<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<Value>,
) -> Response {
    let parsed = parse_body::<RemoveRoleBody>(&body);
    let ctx = request_context(&headers, state.request_timeout);
    let app = &*state;

    let result: Result<RoleRemovalResult, HandlerError> = app
        .gate
        .authorize(ctx, &body, &app.manage_permission, |ctx| async move {
            let request = parsed?;
            let tenant = tenant_of(&ctx)?;
            let op = app
                .roles
                .remove_role(&tenant, &request.context, &request.user_id, &request.role);
            let outcome = within(ctx.deadline, op)
                .await
                .map_err(|_| RoleError::DeadlineExceeded)??;
            Ok::<_, HandlerError>(outcome)
        })
        .await;
    respond(app, "remove_role", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileBody {
    context: ResourceContext,
    user_id: String,
    roles: Vec<String>,
}

async fn reconcile_roles<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<Value>,
) -> Response {
    let parsed = parse_body::<ReconcileBody>(&body);
    let ctx = request_context(&headers, state.request_timeout);
    let app = &*state;

    let result: Result<RoleDiff, HandlerError> = app
        .gate
        .authorize(ctx, &body, &app.manage_permission, |ctx| async move {
            let request = parsed?;
            let tenant = tenant_of(&ctx)?;
            let op = async {
                let entity = app.roles.resolve_entity(&request.context).await?;
                app.roles
                    .reconcile(&tenant, &entity, &request.user_id, &request.roles)
                    .await
            };
            let outcome = within(ctx.deadline, op)
                .await
                .map_err(|_| RoleError::DeadlineExceeded)??;
            Ok::<_, HandlerError>(outcome)
        })
        .await;
    respond(app, "reconcile_roles", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMembersBody {
    context: ResourceContext,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub users: Vec<UserRoles>,
}

async fn list_members<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
    headers: HeaderMap,
    JsonBadRequest(body): JsonBadRequest<Value>,
) -> Response {
    let parsed = parse_body::<ListMembersBody>(&body);
    let ctx = request_context(&headers, state.request_timeout);
    let app = &*state;

    let result: Result<MembersResponse, HandlerError> = app
        .gate
        .authorize(ctx, &body, &app.read_permission, |ctx| async move {
            let request = parsed?;
            let tenant = tenant_of(&ctx)?;
            let op = app
                .roles
                .list_users(&tenant, &request.context, &request.roles);
            let users = within(ctx.deadline, op)
                .await
                .map_err(|_| RoleError::DeadlineExceeded)??;
            Ok::<_, HandlerError>(MembersResponse { users })
        })
        .await;
    respond(app, "list_members", result)
}

// ============================================================
// Health and Readiness Checks
// ============================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Ready once the policy engine answers.
async fn readiness_check<E: PolicyEngine, W: WorkspaceClient>(
    State(state): State<Arc<AppState<E, W>>>,
) -> impl IntoResponse {
    match state.engine.list_stores().await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "checks": { "policy_engine": "ok" } })),
        ),
        Err(e) => {
            error!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "checks": { "policy_engine": "unavailable" }
                })),
            )
        }
    }
}
