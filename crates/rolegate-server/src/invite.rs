//! Invite workflow for users unknown to the identity directory.
//!
//! An invite is a record in the resource's hosting workspace, labelled with
//! a hash of the invited email so repeated assignments create it only once.
//! It never gates access: role tuples are written regardless.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use rolegate_domain::error::WorkspaceError;
use rolegate_domain::model::ResourceContext;
use rolegate_domain::traits::{IdentityDirectory, WorkspaceClient};

use crate::config::InviteSettings;

/// Label carrying the email hash of an invite.
pub const EMAIL_HASH_LABEL: &str = "core.platform-mesh.io/email-hash";

/// Kubernetes label values are limited to 63 characters.
const MAX_LABEL_VALUE_LEN: usize = 63;

const INVITE_NAME_PREFIX: &str = "invite-";

/// Stable, label-safe key for an email address.
///
/// Lowercase hex SHA-256 of the trimmed, lower-cased email, cut to the label
/// value limit.
pub fn invite_dedup_key(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(MAX_LABEL_VALUE_LEN);
    key
}

/// Group, version and kind of invite records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteTarget {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: Option<String>,
}

impl From<&InviteSettings> for InviteTarget {
    fn from(settings: &InviteSettings) -> Self {
        Self {
            group: settings.group.clone(),
            version: settings.version.clone(),
            kind: settings.kind.clone(),
            namespace: settings.namespace.clone().filter(|ns| !ns.is_empty()),
        }
    }
}

impl Default for InviteTarget {
    fn default() -> Self {
        Self::from(&InviteSettings::default())
    }
}

/// What [`InviteManager::ensure_access`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The user is already provisioned.
    UserExists,
    /// An invite for the email already exists.
    AlreadyInvited,
    /// A new invite was created.
    Created { name: String },
}

/// Errors creating an invite.
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("failed to resolve invite resource: {0}")]
    Mapping(#[source] WorkspaceError),

    #[error("failed to list invites: {0}")]
    List(#[source] WorkspaceError),

    #[error("failed to create invite: {0}")]
    Create(#[source] WorkspaceError),
}

/// Creates invite records for unknown users.
pub struct InviteManager<W> {
    identity: Arc<dyn IdentityDirectory>,
    workspace: Arc<W>,
    target: InviteTarget,
}

impl<W> Clone for InviteManager<W> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            workspace: Arc::clone(&self.workspace),
            target: self.target.clone(),
        }
    }
}

impl<W: WorkspaceClient> InviteManager<W> {
    pub fn new(identity: Arc<dyn IdentityDirectory>, workspace: Arc<W>, target: InviteTarget) -> Self {
        Self {
            identity,
            workspace,
            target,
        }
    }

    /// Makes sure `email` will get access to `resource` once provisioned.
    #[instrument(skip(self, resource), fields(account_path = %resource.account_path))]
    pub async fn ensure_access(
        &self,
        email: &str,
        resource: &ResourceContext,
    ) -> Result<InviteOutcome, InviteError> {
        match self.identity.user_by_mail(email).await {
            Ok(Some(_)) => return Ok(InviteOutcome::UserExists),
            Ok(None) => {}
            // An unreachable directory must not block role assignment.
            Err(e) => warn!(error = %e, "identity lookup failed, treating user as unknown"),
        }

        // Invites live in the workspace hosting the resource.
        let path = resource.account_info_path();
        let key = invite_dedup_key(email);

        let mut mapping = self
            .workspace
            .resolve_mapping(&path, &self.target.group, &self.target.kind)
            .await
            .map_err(InviteError::Mapping)?;
        mapping.version = self.target.version.clone();
        let namespace = self.target.namespace.as_deref();

        let existing = self
            .workspace
            .list(&path, &mapping, namespace, &format!("{EMAIL_HASH_LABEL}={key}"))
            .await
            .map_err(InviteError::List)?;
        if !existing.is_empty() {
            debug!(%path, "invite already exists");
            return Ok(InviteOutcome::AlreadyInvited);
        }

        let created = self
            .workspace
            .create(&path, &mapping, namespace, self.invite_object(email, &key))
            .await
            .map_err(InviteError::Create)?;

        let name = created
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(%path, invite = %name, "invite created");
        Ok(InviteOutcome::Created { name })
    }

    fn invite_object(&self, email: &str, key: &str) -> Value {
        let api_version = if self.target.group.is_empty() {
            self.target.version.clone()
        } else {
            format!("{}/{}", self.target.group, self.target.version)
        };

        let mut metadata = Map::new();
        metadata.insert("generateName".to_string(), json!(INVITE_NAME_PREFIX));
        metadata.insert("labels".to_string(), json!({ EMAIL_HASH_LABEL: key }));
        if let Some(ns) = &self.target.namespace {
            metadata.insert("namespace".to_string(), json!(ns));
        }

        json!({
            "apiVersion": api_version,
            "kind": self.target.kind,
            "metadata": metadata,
            "spec": { "email": email.trim() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_domain::model::{AccountInfo, IdentityUser, ResourceMapping};
    use rolegate_storage::{MemoryIdentityDirectory, MemoryWorkspace, WorkspaceOp};

    fn invites_mapping() -> ResourceMapping {
        ResourceMapping {
            group: "core.platform-mesh.io".to_string(),
            version: "v1alpha1".to_string(),
            resource: "invites".to_string(),
            kind: "Invite".to_string(),
            namespaced: false,
        }
    }

    fn setup() -> (
        Arc<MemoryIdentityDirectory>,
        Arc<MemoryWorkspace>,
        InviteManager<MemoryWorkspace>,
    ) {
        let identity = Arc::new(MemoryIdentityDirectory::new());
        let workspace = Arc::new(MemoryWorkspace::new());
        workspace.add_mapping(invites_mapping());
        workspace.add_account_info(
            "root:orgs:acme",
            AccountInfo {
                account_name: "acme".to_string(),
                organization_name: "acme".to_string(),
                origin_cluster_id: "c1".to_string(),
                generated_cluster_id: "c2".to_string(),
            },
        );
        let manager = InviteManager::new(
            identity.clone(),
            Arc::clone(&workspace),
            InviteTarget::default(),
        );
        (identity, workspace, manager)
    }

    fn deployment() -> ResourceContext {
        ResourceContext::new("apps", "Deployment", "d1", "root:orgs:acme")
    }

    #[test]
    fn test_dedup_key_is_label_safe_and_stable() {
        let key = invite_dedup_key("Alice@Example.com ");
        assert_eq!(key.len(), 63);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key, invite_dedup_key("alice@example.com"));
        assert_ne!(key, invite_dedup_key("bob@example.com"));
    }

    #[tokio::test]
    async fn test_known_user_needs_no_invite() {
        let (identity, workspace, manager) = setup();
        identity.add_user(IdentityUser {
            id: "u-1".to_string(),
            email: "alice@example.com".to_string(),
        });

        let outcome = manager
            .ensure_access("alice@example.com", &deployment())
            .await
            .unwrap();

        assert_eq!(outcome, InviteOutcome::UserExists);
        assert_eq!(workspace.call_count(WorkspaceOp::Create), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_invited_once() {
        let (_identity, workspace, manager) = setup();

        let first = manager
            .ensure_access("new@example.com", &deployment())
            .await
            .unwrap();
        assert!(matches!(first, InviteOutcome::Created { ref name } if name.starts_with("invite-")));

        let second = manager
            .ensure_access("NEW@example.com", &deployment())
            .await
            .unwrap();
        assert_eq!(second, InviteOutcome::AlreadyInvited);

        let invites = workspace.objects("root:orgs:acme", &invites_mapping(), None);
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0]["spec"]["email"], "new@example.com");
        assert_eq!(
            invites[0]["metadata"]["labels"][EMAIL_HASH_LABEL],
            invite_dedup_key("new@example.com").as_str()
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_treated_as_unknown_user() {
        let (identity, workspace, manager) = setup();
        identity.add_user(IdentityUser {
            id: "u-1".to_string(),
            email: "alice@example.com".to_string(),
        });
        identity.set_unavailable(true);

        let outcome = manager
            .ensure_access("alice@example.com", &deployment())
            .await
            .unwrap();

        assert!(matches!(outcome, InviteOutcome::Created { .. }));
        assert_eq!(workspace.call_count(WorkspaceOp::Create), 1);
    }

    #[tokio::test]
    async fn test_account_invites_live_in_the_account_workspace() {
        let (_identity, workspace, manager) = setup();
        let account = ResourceContext::account("team-a", "root:orgs:acme");

        manager.ensure_access("x@example.com", &account).await.unwrap();

        assert_eq!(
            workspace
                .objects("root:orgs:acme:team-a", &invites_mapping(), None)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let (_identity, workspace, manager) = setup();
        workspace.fail(
            WorkspaceOp::Create,
            WorkspaceError::Transport {
                message: "forbidden".to_string(),
            },
        );

        let err = manager
            .ensure_access("x@example.com", &deployment())
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::Create(_)));
    }
}
