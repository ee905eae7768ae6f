//! Resolved target of a role operation or permission check.

use serde::{Deserialize, Serialize};

use super::{AccountInfo, ResourceContext, TupleKey};
use crate::naming::{
    fga_type_name, object_id, role_object, role_userset, user_id, ASSIGNEE_RELATION, ROLE_TYPE,
};

/// A resource resolved against its owning account.
///
/// The cluster is the account's generated cluster, except for accounts
/// themselves, which are evaluated in the cluster where they are declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub group: String,
    pub kind: String,
    pub type_name: String,
    pub cluster_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl EntityRef {
    /// Resolves a resource context against its account.
    pub fn from_context(ctx: &ResourceContext, account: &AccountInfo) -> Self {
        let cluster_id = if ctx.is_account() {
            account.origin_cluster_id.clone()
        } else {
            account.generated_cluster_id.clone()
        };

        Self {
            group: ctx.group.clone(),
            kind: ctx.kind.clone(),
            type_name: fga_type_name(&ctx.group, &ctx.kind),
            cluster_id,
            name: ctx.resource.name.clone(),
            namespace: ctx.namespace().map(str::to_string),
        }
    }

    /// `{group}/{kind}` key used by the role catalog.
    pub fn group_resource(&self) -> String {
        super::group_resource_key(&self.group, &self.kind)
    }

    /// Object identifier of the resource.
    pub fn object(&self) -> String {
        object_id(
            &self.type_name,
            &self.cluster_id,
            self.namespace.as_deref(),
            &self.name,
        )
    }

    /// Role object for one of the resource's roles.
    pub fn role_object(&self, role_id: &str) -> String {
        role_object(&self.type_name, &self.cluster_id, &self.name, role_id)
    }

    /// Prefix shared by all role objects of this resource.
    pub fn role_object_prefix(&self) -> String {
        format!("{ROLE_TYPE}:{}/{}/{}/", self.type_name, self.cluster_id, self.name)
    }

    /// Extracts the role id from one of this resource's role objects.
    pub fn role_id_of<'a>(&self, role_object: &'a str) -> Option<&'a str> {
        let prefix = self.role_object_prefix();
        role_object
            .strip_prefix(prefix.as_str())
            .filter(|role| !role.is_empty() && !role.contains('/'))
    }

    /// Tuple making `user` an assignee of `role_id`.
    pub fn assignee_tuple(&self, user: &str, role_id: &str) -> TupleKey {
        TupleKey::new(user_id(user), ASSIGNEE_RELATION, self.role_object(role_id))
    }

    /// Tuple granting `role_id` on the resource to all its assignees.
    pub fn permission_tuple(&self, role_id: &str) -> TupleKey {
        TupleKey::new(
            role_userset(&self.type_name, &self.cluster_id, &self.name, role_id),
            role_id,
            self.object(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountInfo {
        AccountInfo {
            account_name: "acct".to_string(),
            organization_name: "acme".to_string(),
            origin_cluster_id: "c1".to_string(),
            generated_cluster_id: "c2".to_string(),
        }
    }

    #[test]
    fn test_regular_resource_uses_generated_cluster() {
        let ctx = ResourceContext::new("apps", "Deployment", "d1", "root").with_namespace("ns1");
        let entity = EntityRef::from_context(&ctx, &account());
        assert_eq!(entity.cluster_id, "c2");
        assert_eq!(entity.object(), "apps_deployment:c2/ns1/d1");
    }

    #[test]
    fn test_account_uses_origin_cluster() {
        let ctx = ResourceContext::account("acct", "root:orgs:acme");
        let entity = EntityRef::from_context(&ctx, &account());
        assert_eq!(entity.cluster_id, "c1");
        assert_eq!(entity.object(), "core_platform-mesh_io_account:c1/acct");
    }

    #[test]
    fn test_role_tuples() {
        let ctx = ResourceContext::new("apps", "Deployment", "d1", "root");
        let entity = EntityRef::from_context(&ctx, &account());

        let assignee = entity.assignee_tuple("alice", "owner");
        assert_eq!(assignee.user, "user:alice");
        assert_eq!(assignee.relation, "assignee");
        assert_eq!(assignee.object, "role:apps_deployment/c2/d1/owner");

        let permission = entity.permission_tuple("owner");
        assert_eq!(permission.user, "role:apps_deployment/c2/d1/owner#assignee");
        assert_eq!(permission.relation, "owner");
        assert_eq!(permission.object, "apps_deployment:c2/d1");
    }

    #[test]
    fn test_role_id_of() {
        let ctx = ResourceContext::new("apps", "Deployment", "d1", "root");
        let entity = EntityRef::from_context(&ctx, &account());
        assert_eq!(
            entity.role_id_of("role:apps_deployment/c2/d1/owner"),
            Some("owner")
        );
        assert_eq!(entity.role_id_of("role:apps_deployment/c2/d10/owner"), None);
        assert_eq!(entity.role_id_of("role:apps_deployment/c2/d1/"), None);
    }
}
