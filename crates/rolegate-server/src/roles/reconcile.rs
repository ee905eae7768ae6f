//! Reverse listing of a user's roles and diff-based reconciliation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, instrument, warn};

use rolegate_domain::error::DomainError;
use rolegate_domain::model::{EntityRef, RoleDefinition, TenantContext, TupleKey};
use rolegate_domain::naming::{user_id, ASSIGNEE_RELATION, ROLE_TYPE};
use rolegate_domain::traits::{
    PolicyEngine, ReadFilter, ReadRequest, RoleChangeEvent, WorkspaceClient, WriteRequest,
};
use rolegate_domain::WriteClassification;

use super::assign::WriteTarget;
use super::{record_write, RoleDiff, RoleError, RoleManager};

#[derive(Debug, Clone, Copy)]
enum BatchOp {
    Write,
    Delete,
}

/// Page size of the reverse listing.
const READ_PAGE_SIZE: u32 = 100;

impl<E: PolicyEngine, W: WorkspaceClient> RoleManager<E, W> {
    /// Roles the user holds on the entity, keyed by role id, with the stored
    /// assignee tuple.
    #[instrument(skip(self, tenant, entity), fields(org = %tenant.organization, entity = %entity.object()))]
    pub async fn user_roles(
        &self,
        tenant: &TenantContext,
        entity: &EntityRef,
        user: &str,
    ) -> Result<BTreeMap<String, TupleKey>, RoleError> {
        let store_id = self.resolver.get_store_id(&tenant.organization).await?;
        let mut roles = BTreeMap::new();
        let mut continuation_token = None;

        loop {
            let page = self
                .engine()
                .read(ReadRequest {
                    store_id: store_id.clone(),
                    filter: ReadFilter {
                        user: Some(user_id(user)),
                        relation: Some(ASSIGNEE_RELATION.to_string()),
                        object: Some(format!("{ROLE_TYPE}:")),
                    },
                    page_size: READ_PAGE_SIZE,
                    continuation_token,
                })
                .await?;

            for tuple in page.tuples {
                if let Some(role) = entity.role_id_of(&tuple.object).map(str::to_string) {
                    roles.insert(role, tuple);
                }
            }

            continuation_token = page.continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        debug!(count = roles.len(), "listed user roles");
        Ok(roles)
    }

    /// Role definitions the user holds on the entity.
    ///
    /// Roles missing from the catalog are reported with their id as display
    /// name and an empty description.
    pub async fn user_role_definitions(
        &self,
        tenant: &TenantContext,
        entity: &EntityRef,
        user: &str,
    ) -> Result<Vec<RoleDefinition>, RoleError> {
        let held = self.user_roles(tenant, entity, user).await?;
        let catalog: HashMap<String, RoleDefinition> = self
            .catalog
            .role_definitions(&entity.group, &entity.kind)
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(held
            .into_keys()
            .map(|id| {
                catalog
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| RoleDefinition::placeholder(id))
            })
            .collect())
    }

    /// Brings the user's roles on the entity to exactly `desired`.
    ///
    /// Unchanged roles cause no tuple churn. New roles go out in one batched
    /// write and removed roles in one batched delete. Afterwards a
    /// role-change event is sent (failures are only logged) and every catalog
    /// role gets its permission tuple.
    #[instrument(skip(self, tenant, entity, desired), fields(org = %tenant.organization, entity = %entity.object()))]
    pub async fn reconcile(
        &self,
        tenant: &TenantContext,
        entity: &EntityRef,
        user: &str,
        desired: &[String],
    ) -> Result<RoleDiff, RoleError> {
        let known = self.catalog.role_definitions(&entity.group, &entity.kind);
        let known_ids: BTreeSet<&str> = known.iter().map(|r| r.id.as_str()).collect();
        if let Some(role) = desired.iter().find(|r| !known_ids.contains(r.as_str())) {
            return Err(DomainError::RoleNotAllowed {
                role: role.clone(),
                group_resource: entity.group_resource(),
            }
            .into());
        }

        let current = self.user_roles(tenant, entity, user).await?;
        let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();

        let mut diff = RoleDiff::default();
        let mut writes = Vec::new();
        let mut deletes = Vec::new();

        for role in &desired {
            if !current.contains_key(*role) {
                diff.created.push(role.to_string());
                writes.push(entity.assignee_tuple(user, role));
            }
        }
        for (role, stored) in &current {
            if !desired.contains(role.as_str()) {
                diff.deleted.push(role.clone());
                deletes.push(stored.clone());
            }
        }

        if !diff.is_empty() {
            let target = self.write_target(tenant).await?;
            self.apply_batch(&target, BatchOp::Delete, deletes).await?;
            self.apply_batch(&target, BatchOp::Write, writes).await?;

            let event = RoleChangeEvent {
                entity: entity.clone(),
                user_id: user.to_string(),
                added: diff.created.clone(),
                removed: diff.deleted.clone(),
            };
            if let Err(e) = self.notifier.roles_changed(event).await {
                warn!(error = %e, "role change notification failed");
            }
        }

        self.ensure_permission_tuples(tenant, entity, &known).await?;
        Ok(diff)
    }

    /// Sends `tuples` as one write or delete batch.
    ///
    /// The engine rejects a whole batch when a single tuple in it already
    /// exists (or is already gone), so that rejection is retried tuple by
    /// tuple and only the duplicates are skipped.
    async fn apply_batch(
        &self,
        target: &WriteTarget,
        op: BatchOp,
        tuples: Vec<TupleKey>,
    ) -> Result<(), RoleError> {
        if tuples.is_empty() {
            return Ok(());
        }

        let model_id = Some(target.model_id.clone());
        let request = match op {
            BatchOp::Write => WriteRequest::writes(&target.store_id, model_id, tuples.clone()),
            BatchOp::Delete => WriteRequest::deletes(&target.store_id, model_id, tuples.clone()),
        };
        match record_write(self.engine().write(request).await) {
            WriteClassification::Success => return Ok(()),
            WriteClassification::Fatal(e) => return Err(e.into()),
            WriteClassification::AlreadyExists if tuples.len() == 1 => return Ok(()),
            WriteClassification::AlreadyExists => {
                debug!(?op, count = tuples.len(), "batch rejected, applying tuples one by one");
            }
        }

        for tuple in tuples {
            let outcome = match op {
                BatchOp::Write => self.write_tuple(target, tuple).await,
                BatchOp::Delete => self.delete_tuple(target, tuple).await,
            };
            if let WriteClassification::Fatal(e) = outcome {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Writes the permission tuple of every catalog role of the entity.
    pub async fn ensure_permission_tuples(
        &self,
        tenant: &TenantContext,
        entity: &EntityRef,
        roles: &[RoleDefinition],
    ) -> Result<(), RoleError> {
        let target = self.write_target(tenant).await?;
        for role in roles {
            if let WriteClassification::Fatal(e) =
                self.write_tuple(&target, entity.permission_tuple(&role.id)).await
            {
                return Err(e.into());
            }
        }
        Ok(())
    }
}
