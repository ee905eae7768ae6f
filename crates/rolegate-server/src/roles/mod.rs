//! Role assignment, removal, reconciliation and membership listing.
//!
//! A role held by a user on a resource is two tuples:
//!
//! ```text
//! user:{id}                                 assignee  role:{type}/{cluster}/{name}/{role}
//! role:{type}/{cluster}/{name}/{role}#assignee  {role}  {type}:{cluster}/[{ns}/]{name}
//! ```
//!
//! The first makes the user an assignee of the role, the second makes the
//! role effective on the resource. Every write result goes through
//! [`classify_write_error`](rolegate_domain::classify_write_error), so an
//! already existing tuple counts as a success.

mod assign;
mod members;
mod reconcile;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_domain::error::{DomainError, EngineError, WorkspaceError};
use rolegate_domain::model::{EntityRef, ResourceContext, RoleDefinition};
use rolegate_domain::traits::{PolicyEngine, RoleCatalog, RoleChangeNotifier, WorkspaceClient};
use rolegate_domain::{classify_write_error, WriteClassification};

use crate::invite::InviteManager;
use crate::resolver::{ResolverError, StoreResolver};

/// Roles to grant to an existing user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub user_id: String,
    pub roles: Vec<String>,
}

/// Roles to grant to a user who may not be provisioned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInvite {
    pub email: String,
    pub roles: Vec<String>,
}

/// Aggregate outcome of [`RoleManager::assign_roles`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentResult {
    pub success: bool,
    /// Tuple writes that succeeded or found the tuple already present.
    pub assigned_count: usize,
    pub errors: Vec<String>,
}

/// Outcome of [`RoleManager::remove_role`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRemovalResult {
    pub success: bool,
    /// Whether the assignee tuple existed when it was probed.
    pub was_assigned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Changes applied by [`RoleManager::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDiff {
    pub created: Vec<String>,
    /// Always empty. An assignee tuple carries nothing besides the role, so
    /// a held role is either kept or deleted; the field stays for clients
    /// reading the three-way diff.
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl RoleDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// A user and the roles they hold on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoles {
    pub user: String,
    pub roles: Vec<RoleDefinition>,
}

/// Errors failing a whole role operation.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("failed to resolve account: {0}")]
    Account(#[source] WorkspaceError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("policy engine request failed: {0}")]
    Engine(#[from] EngineError),

    #[error("role operation timed out")]
    DeadlineExceeded,
}

impl RoleError {
    /// True if the caller supplied bad input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, RoleError::Domain(_))
    }
}

/// Applies role changes through the policy engine.
pub struct RoleManager<E, W> {
    resolver: StoreResolver<E>,
    workspace: Arc<W>,
    catalog: Arc<dyn RoleCatalog>,
    notifier: Arc<dyn RoleChangeNotifier>,
    invites: InviteManager<W>,
}

impl<E, W> Clone for RoleManager<E, W> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            workspace: Arc::clone(&self.workspace),
            catalog: Arc::clone(&self.catalog),
            notifier: Arc::clone(&self.notifier),
            invites: self.invites.clone(),
        }
    }
}

/// Result of one write, recorded in `rolegate_role_writes_total`.
fn record_write(result: Result<(), EngineError>) -> WriteClassification {
    let classification = classify_write_error(result);
    metrics::counter!("rolegate_role_writes_total", "outcome" => classification.as_str())
        .increment(1);
    classification
}

impl<E: PolicyEngine, W: WorkspaceClient> RoleManager<E, W> {
    pub fn new(
        resolver: StoreResolver<E>,
        workspace: Arc<W>,
        catalog: Arc<dyn RoleCatalog>,
        notifier: Arc<dyn RoleChangeNotifier>,
        invites: InviteManager<W>,
    ) -> Self {
        Self {
            resolver,
            workspace,
            catalog,
            notifier,
            invites,
        }
    }

    fn engine(&self) -> &Arc<E> {
        self.resolver.engine()
    }

    /// Catalog roles of the entity's group and kind.
    pub fn role_definitions(&self, group: &str, kind: &str) -> Vec<RoleDefinition> {
        self.catalog.role_definitions(group, kind)
    }

    /// Resolves a resource context against its account.
    pub async fn resolve_entity(&self, ctx: &ResourceContext) -> Result<EntityRef, RoleError> {
        ctx.validate()?;
        let account = self
            .workspace
            .account_info(&ctx.account_info_path())
            .await
            .map_err(RoleError::Account)?;
        Ok(EntityRef::from_context(ctx, &account))
    }
}
