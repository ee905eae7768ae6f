//! Request-scoped resource and tenant context.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::naming::{is_managed_type, ACCOUNT_GROUP, ACCOUNT_KIND};

/// Name and optional namespace of the target resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Identifies a target resource within the tenant hierarchy.
///
/// Constructed per request from caller-supplied arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    /// API group of the resource ("" for the core group).
    #[serde(default)]
    pub group: String,
    /// Kind of the resource.
    pub kind: String,
    /// Name and namespace of the resource.
    pub resource: ResourceRef,
    /// Workspace path of the account owning the resource.
    pub account_path: String,
}

impl ResourceContext {
    /// Creates a context for a cluster-scoped resource.
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        account_path: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            resource: ResourceRef {
                name: name.into(),
                namespace: None,
            },
            account_path: account_path.into(),
        }
    }

    /// Sets the namespace of the resource.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.resource.namespace = Some(namespace.into());
        self
    }

    /// Returns the namespace, treating an empty string as absent.
    pub fn namespace(&self) -> Option<&str> {
        self.resource.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Returns the resource name.
    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Returns true if the target resource is itself an account.
    pub fn is_account(&self) -> bool {
        is_managed_type(&self.group, &self.kind)
    }

    /// `{group}/{kind}` key used by the role catalog.
    pub fn group_resource(&self) -> String {
        super::group_resource_key(&self.group, &self.kind)
    }

    /// Workspace path holding the account info for this resource.
    ///
    /// An account's own info lives in the workspace the account spans, so
    /// the path is suffixed with the account name.
    pub fn account_info_path(&self) -> String {
        if self.is_account() {
            format!("{}:{}", self.account_path, self.resource.name)
        } else {
            self.account_path.clone()
        }
    }

    /// Checks the fields every operation relies on.
    pub fn validate(&self) -> DomainResult<()> {
        if self.kind.trim().is_empty() {
            return Err(DomainError::InvalidResourceContext {
                message: "kind cannot be empty".to_string(),
            });
        }
        if self.resource.name.trim().is_empty() {
            return Err(DomainError::InvalidResourceContext {
                message: "resource.name cannot be empty".to_string(),
            });
        }
        if self.account_path.trim().is_empty() {
            return Err(DomainError::InvalidResourceContext {
                message: "accountPath cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Context addressing an account by name.
    pub fn account(name: impl Into<String>, parent_path: impl Into<String>) -> Self {
        Self::new(ACCOUNT_GROUP, ACCOUNT_KIND, name, parent_path)
    }
}

/// Describes the account owning a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub account_name: String,
    pub organization_name: String,
    /// Cluster where the account object itself is declared.
    pub origin_cluster_id: String,
    /// Cluster hosting the account's contents.
    pub generated_cluster_id: String,
}

/// Tenant descriptor attached to the request upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Organization name; also the name of the policy-engine store.
    pub organization: String,
}

impl TenantContext {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
        }
    }
}

/// A user known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_loose_json() {
        let value = json!({
            "group": "apps",
            "kind": "Deployment",
            "resource": {"name": "d1", "namespace": "ns1"},
            "accountPath": "root:orgs:acme"
        });
        let ctx: ResourceContext = serde_json::from_value(value).unwrap();
        assert_eq!(ctx.namespace(), Some("ns1"));
        assert_eq!(ctx.group_resource(), "apps/Deployment");
        assert!(!ctx.is_account());
    }

    #[test]
    fn test_empty_namespace_is_absent() {
        let ctx = ResourceContext::new("apps", "Deployment", "d1", "root").with_namespace("");
        assert_eq!(ctx.namespace(), None);
    }

    #[test]
    fn test_account_info_path_is_suffixed_for_accounts() {
        let ctx = ResourceContext::account("acct", "root:orgs:acme");
        assert!(ctx.is_account());
        assert_eq!(ctx.account_info_path(), "root:orgs:acme:acct");

        let ctx = ResourceContext::new("apps", "Deployment", "d1", "root:orgs:acme");
        assert_eq!(ctx.account_info_path(), "root:orgs:acme");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let ctx = ResourceContext::new("apps", "", "d1", "root");
        assert!(ctx.validate().unwrap_err().to_string().contains("kind"));

        let ctx = ResourceContext::new("apps", "Deployment", "d1", " ");
        assert!(ctx.validate().unwrap_err().to_string().contains("accountPath"));
    }
}
