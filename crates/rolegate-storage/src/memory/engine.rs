//! In-memory policy engine.
//!
//! Stores tuples per store in a `BTreeSet` so reads paginate in a stable
//! order. Check evaluation covers direct tuples, wildcards and userset
//! references (`type:id#relation`), which is all the role model needs; it
//! does not interpret authorization model rewrites.
//!
//! Every operation is counted and can be made to fail, so tests can assert
//! how many upstream calls a component issued.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use rolegate_domain::error::{EngineError, EngineResult};
use rolegate_domain::model::{FgaUser, TupleKey};
use rolegate_domain::traits::{
    AuthorizationModelSummary, CheckRequest, ListUsersRequest, PolicyEngine, ReadPage,
    ReadRequest, StoreSummary, WriteRequest,
};

/// Maximum userset nesting followed during a check.
const MAX_CHECK_DEPTH: u32 = 25;

/// Default page size when a read asks for zero.
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Operations of the policy engine, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    ListStores,
    ReadAuthorizationModels,
    Check,
    Write,
    Read,
    ListUsers,
}

/// In-memory implementation of [`PolicyEngine`].
#[derive(Debug, Default)]
pub struct MemoryPolicyEngine {
    stores: DashMap<String, StoreSummary>,
    /// Model ids per store in creation order (newest last).
    models: DashMap<String, Vec<String>>,
    tuples: DashMap<String, BTreeSet<TupleKey>>,
    calls: DashMap<EngineOp, usize>,
    failures: DashMap<EngineOp, EngineError>,
    /// Writes touching an object containing the key fail with the value.
    failing_objects: DashMap<String, EngineError>,
    next_id: AtomicU64,
}

impl MemoryPolicyEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n:06}")
    }

    /// Creates a store and returns its id.
    pub fn create_store(&self, name: &str) -> String {
        let id = self.generate_id("store");
        self.stores.insert(
            id.clone(),
            StoreSummary {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        self.tuples.entry(id.clone()).or_default();
        id
    }

    /// Adds an authorization model to a store and returns its id.
    pub fn write_authorization_model(&self, store_id: &str) -> String {
        let id = self.generate_id("model");
        self.models
            .entry(store_id.to_string())
            .or_default()
            .push(id.clone());
        id
    }

    /// Inserts a tuple directly, bypassing counters and failure injection.
    pub fn insert_tuple(&self, store_id: &str, tuple: TupleKey) {
        self.tuples
            .entry(store_id.to_string())
            .or_default()
            .insert(tuple);
    }

    /// Returns true if the store holds the tuple.
    pub fn contains(&self, store_id: &str, tuple: &TupleKey) -> bool {
        self.tuples
            .get(store_id)
            .map(|t| t.contains(tuple))
            .unwrap_or(false)
    }

    /// All tuples of a store in sorted order.
    pub fn tuples(&self, store_id: &str) -> Vec<TupleKey> {
        self.tuples
            .get(store_id)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of times an operation was called.
    pub fn call_count(&self, op: EngineOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Resets all call counters.
    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Makes every call of `op` fail with `error` until cleared.
    pub fn fail(&self, op: EngineOp, error: EngineError) {
        self.failures.insert(op, error);
    }

    /// Makes writes and deletes touching objects containing `fragment` fail.
    pub fn fail_writes_for(&self, fragment: impl Into<String>, error: EngineError) {
        self.failing_objects.insert(fragment.into(), error);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failures.clear();
        self.failing_objects.clear();
    }

    fn enter(&self, op: EngineOp) -> EngineResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn require_store(&self, store_id: &str) -> EngineResult<()> {
        if self.stores.contains_key(store_id) {
            Ok(())
        } else {
            Err(EngineError::Api {
                status: 404,
                code: "store_id_not_found".to_string(),
                message: format!("store {store_id} not found"),
            })
        }
    }

    fn injected_write_failure(&self, tuple: &TupleKey) -> Option<EngineError> {
        self.failing_objects
            .iter()
            .find(|entry| tuple.object.contains(entry.key().as_str()))
            .map(|entry| entry.value().clone())
    }
}

fn user_type(user: &str) -> &str {
    user.split_once(':').map(|(t, _)| t).unwrap_or(user)
}

/// Resolves `user` `relation` `object` over the given tuples.
fn resolves(tuples: &[TupleKey], user: &str, relation: &str, object: &str, depth: u32) -> bool {
    if depth > MAX_CHECK_DEPTH {
        return false;
    }

    let wildcard = format!("{}:*", user_type(user));
    tuples
        .iter()
        .filter(|t| t.object == object && t.relation == relation)
        .any(|t| {
            if t.user == user || t.user == wildcard {
                return true;
            }
            match t.user.split_once('#') {
                Some((set_object, set_relation)) => {
                    resolves(tuples, user, set_relation, set_object, depth + 1)
                }
                None => false,
            }
        })
}

fn matches_filter(tuple: &TupleKey, request: &ReadRequest) -> bool {
    let filter = &request.filter;
    if let Some(user) = &filter.user {
        if &tuple.user != user {
            return false;
        }
    }
    if let Some(relation) = &filter.relation {
        if &tuple.relation != relation {
            return false;
        }
    }
    if let Some(object) = &filter.object {
        if object.ends_with(':') {
            if !tuple.object.starts_with(object.as_str()) {
                return false;
            }
        } else if &tuple.object != object {
            return false;
        }
    }
    true
}

#[async_trait]
impl PolicyEngine for MemoryPolicyEngine {
    async fn list_stores(&self) -> EngineResult<Vec<StoreSummary>> {
        self.enter(EngineOp::ListStores)?;
        let mut stores: Vec<StoreSummary> =
            self.stores.iter().map(|s| s.value().clone()).collect();
        stores.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stores)
    }

    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> EngineResult<Vec<AuthorizationModelSummary>> {
        self.enter(EngineOp::ReadAuthorizationModels)?;
        self.require_store(store_id)?;
        Ok(self
            .models
            .get(store_id)
            .map(|models| {
                models
                    .iter()
                    .rev()
                    .map(|id| AuthorizationModelSummary { id: id.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    async fn check(&self, request: CheckRequest) -> EngineResult<bool> {
        self.enter(EngineOp::Check)?;
        self.require_store(&request.store_id)?;

        let mut tuples = self.tuples(&request.store_id);
        tuples.extend(request.contextual_tuples.iter().cloned());

        let key = &request.tuple_key;
        Ok(resolves(&tuples, &key.user, &key.relation, &key.object, 0))
    }

    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    async fn write(&self, request: WriteRequest) -> EngineResult<()> {
        self.enter(EngineOp::Write)?;
        self.require_store(&request.store_id)?;

        for tuple in request.writes.iter().chain(request.deletes.iter()) {
            if let Some(err) = self.injected_write_failure(tuple) {
                return Err(err);
            }
        }

        let mut entry = self.tuples.entry(request.store_id.clone()).or_default();
        let stored = entry.value_mut();

        // All-or-nothing: validate the whole batch before applying it.
        if let Some(existing) = request.writes.iter().find(|t| stored.contains(*t)) {
            return Err(EngineError::duplicate_write(format!(
                "cannot write a tuple which already exists: {existing}"
            )));
        }
        if let Some(missing) = request.deletes.iter().find(|t| !stored.contains(*t)) {
            return Err(EngineError::duplicate_write(format!(
                "cannot delete a tuple which does not exist: {missing}"
            )));
        }

        for tuple in request.deletes {
            stored.remove(&tuple);
        }
        for tuple in request.writes {
            stored.insert(tuple);
        }
        Ok(())
    }

    async fn read(&self, request: ReadRequest) -> EngineResult<ReadPage> {
        self.enter(EngineOp::Read)?;
        self.require_store(&request.store_id)?;

        let offset = match request.continuation_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token.parse::<usize>().map_err(|_| EngineError::Api {
                status: 400,
                code: "invalid_continuation_token".to_string(),
                message: format!("invalid continuation token: {token}"),
            })?,
        };
        let page_size = if request.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            request.page_size
        } as usize;

        let matching: Vec<TupleKey> = self
            .tuples(&request.store_id)
            .into_iter()
            .filter(|t| matches_filter(t, &request))
            .collect();

        let tuples: Vec<TupleKey> = matching.iter().skip(offset).take(page_size).cloned().collect();
        let next = offset + tuples.len();
        let continuation_token = (next < matching.len()).then(|| next.to_string());

        Ok(ReadPage {
            tuples,
            continuation_token,
        })
    }

    async fn list_users(&self, request: ListUsersRequest) -> EngineResult<Vec<FgaUser>> {
        self.enter(EngineOp::ListUsers)?;
        self.require_store(&request.store_id)?;

        let users = self
            .tuples(&request.store_id)
            .into_iter()
            .filter(|t| t.object == request.object && t.relation == request.relation)
            .filter_map(|t| {
                let (kind, id) = t.user.split_once(':')?;
                if kind != request.user_type || id.contains('#') {
                    return None;
                }
                if id == "*" {
                    Some(FgaUser::UserRef(t.user.clone()))
                } else {
                    Some(FgaUser::object(kind, id))
                }
            })
            .collect();

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_domain::traits::ReadFilter;

    fn engine_with_store() -> (MemoryPolicyEngine, String) {
        let engine = MemoryPolicyEngine::new();
        let store = engine.create_store("acme");
        (engine, store)
    }

    #[tokio::test]
    async fn test_list_stores_returns_created_stores() {
        let engine = MemoryPolicyEngine::new();
        engine.create_store("acme");
        engine.create_store("globex");

        let stores = engine.list_stores().await.unwrap();
        let names: Vec<_> = stores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["acme", "globex"]);
        assert_eq!(engine.call_count(EngineOp::ListStores), 1);
    }

    #[tokio::test]
    async fn test_models_are_returned_newest_first() {
        let (engine, store) = engine_with_store();
        let first = engine.write_authorization_model(&store);
        let second = engine.write_authorization_model(&store);

        let models = engine.read_authorization_models(&store).await.unwrap();
        assert_eq!(models[0].id, second);
        assert_eq!(models[1].id, first);
    }

    #[tokio::test]
    async fn test_duplicate_write_uses_invalid_input_code() {
        let (engine, store) = engine_with_store();
        let tuple = TupleKey::new("user:alice", "assignee", "role:x/c/r/owner");

        engine
            .write(WriteRequest::writes(&store, None, vec![tuple.clone()]))
            .await
            .unwrap();
        let err = engine
            .write(WriteRequest::writes(&store, None, vec![tuple]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("write_failed_due_to_invalid_input"));
    }

    #[tokio::test]
    async fn test_write_batch_is_all_or_nothing() {
        let (engine, store) = engine_with_store();
        let existing = TupleKey::new("user:alice", "assignee", "role:x/c/r/owner");
        let fresh = TupleKey::new("user:bob", "assignee", "role:x/c/r/owner");
        engine.insert_tuple(&store, existing.clone());

        let result = engine
            .write(WriteRequest::writes(&store, None, vec![fresh.clone(), existing]))
            .await;

        assert!(result.is_err());
        assert!(!engine.contains(&store, &fresh));
    }

    #[tokio::test]
    async fn test_check_follows_usersets_and_contextual_tuples() {
        let (engine, store) = engine_with_store();
        engine.insert_tuple(
            &store,
            TupleKey::new("user:alice", "assignee", "role:apps_deployment/c2/d1/owner"),
        );
        engine.insert_tuple(
            &store,
            TupleKey::new(
                "role:apps_deployment/c2/d1/owner#assignee",
                "owner",
                "apps_deployment:c2/d1",
            ),
        );

        let allowed = engine
            .check(CheckRequest {
                store_id: store.clone(),
                authorization_model_id: None,
                tuple_key: TupleKey::new("user:alice", "owner", "apps_deployment:c2/d1"),
                contextual_tuples: vec![],
            })
            .await
            .unwrap();
        assert!(allowed);

        let denied = engine
            .check(CheckRequest {
                store_id: store.clone(),
                authorization_model_id: None,
                tuple_key: TupleKey::new("user:bob", "owner", "apps_deployment:c2/d1"),
                contextual_tuples: vec![],
            })
            .await
            .unwrap();
        assert!(!denied);

        let contextual = engine
            .check(CheckRequest {
                store_id: store,
                authorization_model_id: None,
                tuple_key: TupleKey::new("user:bob", "viewer", "doc:1"),
                contextual_tuples: vec![TupleKey::new("user:bob", "viewer", "doc:1")],
            })
            .await
            .unwrap();
        assert!(contextual);
    }

    #[tokio::test]
    async fn test_read_paginates_with_type_prefix() {
        let (engine, store) = engine_with_store();
        for i in 0..5 {
            engine.insert_tuple(
                &store,
                TupleKey::new("user:alice", "assignee", format!("role:x/c/r/role{i}")),
            );
        }
        engine.insert_tuple(&store, TupleKey::new("user:alice", "viewer", "doc:1"));

        let mut token = None;
        let mut seen = Vec::new();
        loop {
            let page = engine
                .read(ReadRequest {
                    store_id: store.clone(),
                    filter: ReadFilter {
                        user: Some("user:alice".to_string()),
                        relation: Some("assignee".to_string()),
                        object: Some("role:".to_string()),
                    },
                    page_size: 2,
                    continuation_token: token,
                })
                .await
                .unwrap();
            seen.extend(page.tuples);
            token = page.continuation_token;
            if token.is_none() {
                break;
            }
        }

        assert_eq!(seen.len(), 5);
        assert_eq!(engine.call_count(EngineOp::Read), 3);
    }

    #[tokio::test]
    async fn test_list_users_filters_by_type() {
        let (engine, store) = engine_with_store();
        let object = "role:x/c/r/owner";
        engine.insert_tuple(&store, TupleKey::new("user:alice", "assignee", object));
        engine.insert_tuple(&store, TupleKey::new("group:eng#member", "assignee", object));

        let users = engine
            .list_users(ListUsersRequest {
                store_id: store,
                authorization_model_id: None,
                object: object.to_string(),
                relation: "assignee".to_string(),
                user_type: "user".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(users, vec![FgaUser::object("user", "alice")]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (engine, store) = engine_with_store();
        engine.fail(
            EngineOp::ListStores,
            EngineError::Transport {
                message: "down".to_string(),
            },
        );
        assert!(engine.list_stores().await.is_err());

        engine.fail_writes_for(
            "/member",
            EngineError::Transport {
                message: "boom".to_string(),
            },
        );
        let err = engine
            .write(WriteRequest::writes(
                &store,
                None,
                vec![TupleKey::new("user:alice", "assignee", "role:x/c/r/member")],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport { .. }));

        engine.clear_failures();
        assert!(engine.list_stores().await.is_ok());
    }
}
