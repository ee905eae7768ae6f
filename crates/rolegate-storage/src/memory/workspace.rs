//! In-memory workspace API.
//!
//! Objects are stored per `(account path, resource, namespace)` and
//! addressed by `metadata.name`. REST mappings are registered globally by
//! group and kind, the way a shared API export makes them visible in every
//! workspace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use rolegate_domain::error::{WorkspaceError, WorkspaceResult};
use rolegate_domain::model::{AccountInfo, ResourceMapping};
use rolegate_domain::traits::WorkspaceClient;

/// Operations of the workspace API, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceOp {
    AccountInfo,
    ResolveMapping,
    Get,
    List,
    Create,
}

type ObjectKey = (String, String, String);

/// In-memory implementation of [`WorkspaceClient`].
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    account_infos: DashMap<String, AccountInfo>,
    mappings: DashMap<(String, String), ResourceMapping>,
    objects: DashMap<ObjectKey, BTreeMap<String, Value>>,
    calls: DashMap<WorkspaceOp, usize>,
    failures: DashMap<WorkspaceOp, WorkspaceError>,
    generated: AtomicU64,
}

fn object_key(path: &str, mapping: &ResourceMapping, namespace: Option<&str>) -> ObjectKey {
    (
        path.to_string(),
        mapping.resource.clone(),
        namespace.unwrap_or_default().to_string(),
    )
}

fn object_name(object: &Value) -> Option<&str> {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Parses an equality selector `k=v[,k=v]`. Empty selectors match everything.
fn parse_selector(selector: &str) -> WorkspaceResult<HashMap<String, String>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| WorkspaceError::InvalidResponse {
                    message: format!("unsupported label selector: {part}"),
                })
        })
        .collect()
}

fn labels_match(object: &Value, selector: &HashMap<String, String>) -> bool {
    selector.iter().all(|(key, expected)| {
        object
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the account info served at `account_path`.
    pub fn add_account_info(&self, account_path: impl Into<String>, info: AccountInfo) {
        self.account_infos.insert(account_path.into(), info);
    }

    /// Registers a REST mapping.
    pub fn add_mapping(&self, mapping: ResourceMapping) {
        self.mappings
            .insert((mapping.group.clone(), mapping.kind.clone()), mapping);
    }

    /// Stores an object directly, bypassing counters and failure injection.
    pub fn insert_object(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: Value,
    ) {
        if let Some(name) = object_name(&object).map(str::to_string) {
            self.objects
                .entry(object_key(account_path, mapping, namespace))
                .or_default()
                .insert(name, object);
        }
    }

    /// All objects stored for a resource in a namespace.
    pub fn objects(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
    ) -> Vec<Value> {
        self.objects
            .get(&object_key(account_path, mapping, namespace))
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn call_count(&self, op: WorkspaceOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Makes every call of `op` fail with `error` until cleared.
    pub fn fail(&self, op: WorkspaceOp, error: WorkspaceError) {
        self.failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    fn enter(&self, op: WorkspaceOp) -> WorkspaceResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WorkspaceClient for MemoryWorkspace {
    async fn account_info(&self, account_path: &str) -> WorkspaceResult<AccountInfo> {
        self.enter(WorkspaceOp::AccountInfo)?;
        self.account_infos
            .get(account_path)
            .map(|info| info.value().clone())
            .ok_or_else(|| WorkspaceError::NotFound {
                what: format!("accountinfo in {account_path}"),
            })
    }

    async fn resolve_mapping(
        &self,
        _account_path: &str,
        group: &str,
        kind: &str,
    ) -> WorkspaceResult<ResourceMapping> {
        self.enter(WorkspaceOp::ResolveMapping)?;
        self.mappings
            .get(&(group.to_string(), kind.to_string()))
            .map(|m| m.value().clone())
            .ok_or_else(|| WorkspaceError::MappingNotFound {
                group: group.to_string(),
                kind: kind.to_string(),
            })
    }

    async fn get(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> WorkspaceResult<Value> {
        self.enter(WorkspaceOp::Get)?;
        self.objects
            .get(&object_key(account_path, mapping, namespace))
            .and_then(|objects| objects.get(name).cloned())
            .ok_or_else(|| WorkspaceError::NotFound {
                what: format!("{} {name} in {account_path}", mapping.resource),
            })
    }

    async fn list(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> WorkspaceResult<Vec<Value>> {
        self.enter(WorkspaceOp::List)?;
        let selector = parse_selector(label_selector)?;
        Ok(self
            .objects(account_path, mapping, namespace)
            .into_iter()
            .filter(|object| labels_match(object, &selector))
            .collect())
    }

    async fn create(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        mut object: Value,
    ) -> WorkspaceResult<Value> {
        self.enter(WorkspaceOp::Create)?;

        let name = match object_name(&object) {
            Some(name) => name.to_string(),
            None => {
                let prefix = object
                    .pointer("/metadata/generateName")
                    .and_then(Value::as_str)
                    .ok_or_else(|| WorkspaceError::InvalidResponse {
                        message: "name or generateName is required".to_string(),
                    })?;
                let n = self.generated.fetch_add(1, Ordering::Relaxed) + 1;
                let name = format!("{prefix}{n:05}");
                if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.insert("name".to_string(), Value::String(name.clone()));
                }
                name
            }
        };

        let mut objects = self
            .objects
            .entry(object_key(account_path, mapping, namespace))
            .or_default();
        if objects.contains_key(&name) {
            return Err(WorkspaceError::AlreadyExists {
                what: format!("{} {name}", mapping.resource),
            });
        }
        objects.insert(name, object.clone());
        Ok(object)
    }
}
