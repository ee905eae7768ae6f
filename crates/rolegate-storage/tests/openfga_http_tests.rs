//! OpenFGA HTTP client tests against a local stand-in server.
//!
//! The stand-in speaks the subset of the engine's REST API the client
//! uses and records what it receives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use rolegate_domain::classify::{classify_write_error, WriteClassification};
use rolegate_domain::error::EngineError;
use rolegate_domain::model::{FgaUser, TupleKey};
use rolegate_domain::traits::{
    CheckRequest, ListUsersRequest, PolicyEngine, ReadFilter, ReadRequest, WriteRequest,
};
use rolegate_storage::OpenFgaHttpEngine;

const TOKEN: &str = "secret-token";

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Recorded {
    fn push(&self, route: &str, headers: &HeaderMap, body: Value) {
        self.bodies.lock().unwrap().push((route.to_string(), body));
        self.auth.lock().unwrap().push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }

    fn last(&self, route: &str) -> Value {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| r == route)
            .map(|(_, b)| b.clone())
            .unwrap()
    }
}

async fn list_stores(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    rec.push("stores", &headers, json!(query));
    match query.get("continuation_token").map(String::as_str) {
        None => Json(json!({
            "stores": [{"id": "s1", "name": "acme"}],
            "continuation_token": "page-2"
        })),
        Some(_) => Json(json!({
            "stores": [{"id": "s2", "name": "globex"}],
            "continuation_token": ""
        })),
    }
}

async fn read_models(Path(store_id): Path<String>) -> impl IntoResponse {
    if store_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"code": "store_id_not_found", "message": "store not found"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"authorization_models": [{"id": "m2"}, {"id": "m1"}]})),
    )
}

async fn check(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let allowed = body["tuple_key"]["relation"] == "get";
    rec.push("check", &headers, body);
    Json(json!({"allowed": allowed}))
}

async fn write(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let duplicate = body["writes"]["tuple_keys"]
        .as_array()
        .map(|keys| keys.iter().any(|k| k["object"] == "role:dup"))
        .unwrap_or(false);
    rec.push("write", &headers, body);
    if duplicate {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "write_failed_due_to_invalid_input",
                "message": "cannot write a tuple which already exists"
            })),
        );
    }
    (StatusCode::OK, Json(json!({})))
}

async fn read(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let first_page = body.get("continuation_token").is_none();
    rec.push("read", &headers, body);
    if first_page {
        Json(json!({
            "tuples": [{"key": {
                "user": "user:alice",
                "relation": "assignee",
                "object": "role:a/c/r/owner"
            }}],
            "continuation_token": "next"
        }))
    } else {
        Json(json!({"tuples": [], "continuation_token": ""}))
    }
}

async fn list_users(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push("list-users", &headers, body);
    Json(json!({
        "users": [
            {"object": {"type": "user", "id": "alice"}},
            {"wildcard": {"type": "user"}}
        ]
    }))
}

async fn spawn_engine(token: Option<&str>) -> (OpenFgaHttpEngine, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/stores", get(list_stores))
        .route("/stores/:store_id/authorization-models", get(read_models))
        .route("/stores/:store_id/check", post(check))
        .route("/stores/:store_id/write", post(write))
        .route("/stores/:store_id/read", post(read))
        .route("/stores/:store_id/list-users", post(list_users))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let engine = OpenFgaHttpEngine::new(
        format!("http://{addr}/"),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap();
    (engine, recorded)
}

#[tokio::test]
async fn test_list_stores_follows_continuation() {
    let (engine, recorded) = spawn_engine(Some(TOKEN)).await;

    let stores = engine.list_stores().await.unwrap();

    let names: Vec<_> = stores.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["acme", "globex"]);
    assert_eq!(recorded.last("stores")["continuation_token"], "page-2");
    assert!(recorded
        .auth
        .lock()
        .unwrap()
        .iter()
        .all(|a| a.as_deref() == Some("Bearer secret-token")));
}

#[tokio::test]
async fn test_requests_without_token_carry_no_authorization() {
    let (engine, recorded) = spawn_engine(None).await;

    engine.list_stores().await.unwrap();

    assert!(recorded.auth.lock().unwrap().iter().all(Option::is_none));
}

#[tokio::test]
async fn test_models_keep_engine_order_and_errors_keep_code() {
    let (engine, _) = spawn_engine(None).await;

    let models = engine.read_authorization_models("s1").await.unwrap();
    assert_eq!(models[0].id, "m2");

    let err = engine.read_authorization_models("missing").await.unwrap_err();
    match err {
        EngineError::Api { status, code, .. } => {
            assert_eq!(status, 404);
            assert_eq!(code, "store_id_not_found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_check_sends_contextual_tuples() {
    let (engine, recorded) = spawn_engine(None).await;
    let request = CheckRequest {
        store_id: "s1".to_string(),
        authorization_model_id: None,
        tuple_key: TupleKey::new("user:alice@example.com", "get", "apps_deployment:c2/ns1/d1"),
        contextual_tuples: vec![TupleKey::new(
            "core_namespace:c2/ns1",
            "parent",
            "apps_deployment:c2/ns1/d1",
        )],
    };

    assert!(engine.check(request).await.unwrap());

    let body = recorded.last("check");
    assert_eq!(
        body["contextual_tuples"]["tuple_keys"][0]["user"],
        "core_namespace:c2/ns1"
    );
    assert!(body.get("authorization_model_id").is_none());
}

#[tokio::test]
async fn test_duplicate_write_is_classified_as_existing() {
    let (engine, recorded) = spawn_engine(None).await;
    let write = |object: &str| WriteRequest {
        store_id: "s1".to_string(),
        authorization_model_id: Some("m1".to_string()),
        writes: vec![TupleKey::new("user:alice", "assignee", object)],
        deletes: vec![],
    };

    let fresh = classify_write_error(engine.write(write("role:new")).await);
    let duplicate = classify_write_error(engine.write(write("role:dup")).await);

    assert!(matches!(fresh, WriteClassification::Success));
    assert!(matches!(duplicate, WriteClassification::AlreadyExists));
    assert_eq!(recorded.last("write")["authorization_model_id"], "m1");
}

#[tokio::test]
async fn test_read_returns_continuation_token() {
    let (engine, recorded) = spawn_engine(None).await;
    let mut request = ReadRequest {
        store_id: "s1".to_string(),
        filter: ReadFilter {
            user: Some("user:alice".to_string()),
            relation: Some("assignee".to_string()),
            object: Some("role:".to_string()),
        },
        page_size: 100,
        continuation_token: None,
    };

    let first = engine.read(request.clone()).await.unwrap();
    assert_eq!(first.tuples.len(), 1);
    assert_eq!(first.continuation_token.as_deref(), Some("next"));

    request.continuation_token = first.continuation_token;
    let second = engine.read(request).await.unwrap();
    assert!(second.tuples.is_empty());
    assert!(second.continuation_token.is_none());
    assert_eq!(recorded.last("read")["page_size"], 100);
}

#[tokio::test]
async fn test_list_users_splits_object() {
    let (engine, recorded) = spawn_engine(None).await;

    let users = engine
        .list_users(ListUsersRequest {
            store_id: "s1".to_string(),
            authorization_model_id: Some("m1".to_string()),
            object: "role:apps_deployment/c2/d1/owner".to_string(),
            relation: "assignee".to_string(),
            user_type: "user".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        users,
        vec![FgaUser::object("user", "alice"), FgaUser::UserRef("user:*".to_string())]
    );
    let body = recorded.last("list-users");
    assert_eq!(body["object"]["type"], "role");
    assert_eq!(body["object"]["id"], "apps_deployment/c2/d1/owner");
    assert_eq!(body["user_filters"][0]["type"], "user");
}

#[tokio::test]
async fn test_unreachable_engine_is_transport_error() {
    let engine =
        OpenFgaHttpEngine::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap();

    let err = engine.list_stores().await.unwrap_err();

    assert!(matches!(err, EngineError::Transport { .. }));
}
