//! Interfaces of the external collaborators.
//!
//! The server layer depends only on these traits; concrete HTTP and
//! in-memory implementations live in `rolegate-storage`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineResult, IdentityResult, NotifyError, WorkspaceResult};
use crate::model::{AccountInfo, EntityRef, FgaUser, IdentityUser, ResourceMapping, RoleDefinition, TupleKey};

/// Store metadata returned by `ListStores`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub id: String,
    pub name: String,
}

/// Authorization model metadata returned by `ReadAuthorizationModels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationModelSummary {
    pub id: String,
}

/// A single relationship check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub store_id: String,
    pub authorization_model_id: Option<String>,
    pub tuple_key: TupleKey,
    /// Tuples valid only for this check.
    pub contextual_tuples: Vec<TupleKey>,
}

/// A batch of tuple writes and deletes.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub store_id: String,
    pub authorization_model_id: Option<String>,
    pub writes: Vec<TupleKey>,
    /// Deletion keys; conditions are never part of a delete.
    pub deletes: Vec<TupleKey>,
}

impl WriteRequest {
    /// Request writing the given tuples.
    pub fn writes(
        store_id: impl Into<String>,
        authorization_model_id: Option<String>,
        writes: Vec<TupleKey>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            authorization_model_id,
            writes,
            deletes: Vec::new(),
        }
    }

    /// Request deleting the given tuples.
    pub fn deletes(
        store_id: impl Into<String>,
        authorization_model_id: Option<String>,
        deletes: Vec<TupleKey>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            authorization_model_id,
            writes: Vec::new(),
            deletes,
        }
    }
}

/// Partial tuple key used to filter `Read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadFilter {
    pub user: Option<String>,
    pub relation: Option<String>,
    /// Full object id, or `type:` to match every object of a type.
    pub object: Option<String>,
}

/// A paginated `Read`.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub store_id: String,
    pub filter: ReadFilter,
    pub page_size: u32,
    pub continuation_token: Option<String>,
}

/// One page of `Read` results.
#[derive(Debug, Clone, Default)]
pub struct ReadPage {
    pub tuples: Vec<TupleKey>,
    /// `None` once the last page has been returned.
    pub continuation_token: Option<String>,
}

/// A `ListUsers` query.
#[derive(Debug, Clone)]
pub struct ListUsersRequest {
    pub store_id: String,
    pub authorization_model_id: Option<String>,
    /// Object as `type:id`.
    pub object: String,
    pub relation: String,
    /// Only users of this type are returned.
    pub user_type: String,
}

/// Relationship-based policy engine.
///
/// Treated as an opaque tuple store; evaluation semantics are the engine's.
#[async_trait]
pub trait PolicyEngine: Send + Sync + 'static {
    /// Lists all stores.
    async fn list_stores(&self) -> EngineResult<Vec<StoreSummary>>;

    /// Lists authorization models of a store, newest first.
    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> EngineResult<Vec<AuthorizationModelSummary>>;

    /// Checks a relationship.
    async fn check(&self, request: CheckRequest) -> EngineResult<bool>;

    /// Writes and deletes tuples.
    async fn write(&self, request: WriteRequest) -> EngineResult<()>;

    /// Reads one page of tuples matching a filter.
    async fn read(&self, request: ReadRequest) -> EngineResult<ReadPage>;

    /// Lists users holding a relation on an object.
    async fn list_users(&self, request: ListUsersRequest) -> EngineResult<Vec<FgaUser>>;
}

/// Workspace (resource hierarchy) API scoped by account path.
#[async_trait]
pub trait WorkspaceClient: Send + Sync + 'static {
    /// Fetches the singular account info of a workspace.
    async fn account_info(&self, account_path: &str) -> WorkspaceResult<AccountInfo>;

    /// Resolves a group/kind to a concrete resource and version.
    async fn resolve_mapping(
        &self,
        account_path: &str,
        group: &str,
        kind: &str,
    ) -> WorkspaceResult<ResourceMapping>;

    /// Gets an object by name. Missing objects yield `WorkspaceError::NotFound`.
    async fn get(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> WorkspaceResult<Value>;

    /// Lists objects matching an equality label selector (`k=v[,k=v]`).
    async fn list(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> WorkspaceResult<Vec<Value>>;

    /// Creates an object and returns the stored version.
    async fn create(
        &self,
        account_path: &str,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: Value,
    ) -> WorkspaceResult<Value>;
}

/// Directory of provisioned users.
#[async_trait]
pub trait IdentityDirectory: Send + Sync + 'static {
    /// Looks a user up by email; `Ok(None)` if unknown.
    async fn user_by_mail(&self, email: &str) -> IdentityResult<Option<IdentityUser>>;
}

/// Catalog of assignable roles per group-resource.
///
/// Implementations return a snapshot; a reload between requests may change
/// what later calls see.
pub trait RoleCatalog: Send + Sync + 'static {
    /// Roles assignable on resources of `group`/`kind`.
    fn role_definitions(&self, group: &str, kind: &str) -> Vec<RoleDefinition>;
}

/// A user's role set on an entity changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChangeEvent {
    pub entity: EntityRef,
    pub user_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Sink for role-change events. Delivery is best-effort.
#[async_trait]
pub trait RoleChangeNotifier: Send + Sync + 'static {
    async fn roles_changed(&self, event: RoleChangeEvent) -> Result<(), NotifyError>;
}
