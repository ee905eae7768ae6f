//! Parallel role-membership query.

use std::collections::{BTreeMap, HashMap};

use futures::future::try_join_all;
use tracing::{debug, instrument};

use rolegate_domain::model::{ResourceContext, RoleDefinition, TenantContext};
use rolegate_domain::naming::{strip_user_prefix, ASSIGNEE_RELATION, USER_TYPE};
use rolegate_domain::traits::{ListUsersRequest, PolicyEngine, WorkspaceClient};

use super::{RoleError, RoleManager, UserRoles};

impl<E: PolicyEngine, W: WorkspaceClient> RoleManager<E, W> {
    /// Lists the users holding roles on a resource.
    ///
    /// The role set is the catalog for the resource's group and kind,
    /// narrowed to `filters` when any are given. One ListUsers query runs
    /// per role, all concurrently; the first failure fails the whole call.
    /// Users are returned sorted, each with their roles in catalog order.
    #[instrument(skip(self, tenant, ctx), fields(org = %tenant.organization))]
    pub async fn list_users(
        &self,
        tenant: &TenantContext,
        ctx: &ResourceContext,
        filters: &[String],
    ) -> Result<Vec<UserRoles>, RoleError> {
        let roles: Vec<RoleDefinition> = self
            .catalog
            .role_definitions(&ctx.group, &ctx.kind)
            .into_iter()
            .filter(|r| filters.is_empty() || filters.contains(&r.id))
            .collect();
        if roles.is_empty() {
            debug!("no roles to query");
            return Ok(Vec::new());
        }

        let entity = self.resolve_entity(ctx).await?;
        let store_id = self.resolver.get_store_id(&tenant.organization).await?;
        let model_id = self.resolver.get_model_id(&tenant.organization).await?;

        let queries = roles.iter().map(|role| {
            let request = ListUsersRequest {
                store_id: store_id.clone(),
                authorization_model_id: Some(model_id.clone()),
                object: entity.role_object(&role.id),
                relation: ASSIGNEE_RELATION.to_string(),
                user_type: USER_TYPE.to_string(),
            };
            async move {
                let users = self.engine().list_users(request).await?;
                Ok::<_, RoleError>((role.id.as_str(), users))
            }
        });
        let results = try_join_all(queries).await?;

        let by_id: HashMap<&str, &RoleDefinition> =
            roles.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut members: BTreeMap<String, Vec<RoleDefinition>> = BTreeMap::new();
        for (role_id, users) in results {
            let definition = by_id
                .get(role_id)
                .map(|r| (*r).clone())
                .unwrap_or_else(|| RoleDefinition::placeholder(role_id));
            for user in users {
                let user = user.into_user_string();
                members
                    .entry(strip_user_prefix(&user).to_string())
                    .or_default()
                    .push(definition.clone());
            }
        }

        debug!(roles = roles.len(), users = members.len(), "listed role members");
        Ok(members
            .into_iter()
            .map(|(user, roles)| UserRoles { user, roles })
            .collect())
    }
}
