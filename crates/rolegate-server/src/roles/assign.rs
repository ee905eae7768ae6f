//! Assigning and removing individual roles.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use rolegate_domain::error::DomainError;
use rolegate_domain::model::{EntityRef, ResourceContext, TenantContext, TupleKey};
use rolegate_domain::traits::{PolicyEngine, ReadFilter, ReadRequest, WorkspaceClient, WriteRequest};
use rolegate_domain::WriteClassification;

use super::{
    record_write, RoleAssignmentResult, RoleChange, RoleError, RoleInvite, RoleManager,
    RoleRemovalResult,
};

/// Store and model a batch of writes goes to.
pub(super) struct WriteTarget {
    pub store_id: String,
    pub model_id: String,
}

impl<E: PolicyEngine, W: WorkspaceClient> RoleManager<E, W> {
    pub(super) async fn write_target(&self, tenant: &TenantContext) -> Result<WriteTarget, RoleError> {
        let store_id = self.resolver.get_store_id(&tenant.organization).await?;
        let model_id = self.resolver.get_model_id(&tenant.organization).await?;
        Ok(WriteTarget { store_id, model_id })
    }

    pub(super) async fn write_tuple(&self, target: &WriteTarget, tuple: TupleKey) -> WriteClassification {
        let request = WriteRequest::writes(
            &target.store_id,
            Some(target.model_id.clone()),
            vec![tuple],
        );
        record_write(self.engine().write(request).await)
    }

    pub(super) async fn delete_tuple(&self, target: &WriteTarget, tuple: TupleKey) -> WriteClassification {
        let request = WriteRequest::deletes(
            &target.store_id,
            Some(target.model_id.clone()),
            vec![tuple],
        );
        record_write(self.engine().write(request).await)
    }

    fn allowed_roles(&self, entity: &EntityRef) -> HashSet<String> {
        self.catalog
            .role_definitions(&entity.group, &entity.kind)
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    /// Grants roles to existing users and invited emails.
    ///
    /// Per-item failures are collected in the result and processing
    /// continues; only a failure to resolve the resource or store fails the
    /// whole call.
    #[instrument(skip(self, tenant, ctx, changes, invites), fields(org = %tenant.organization))]
    pub async fn assign_roles(
        &self,
        tenant: &TenantContext,
        ctx: &ResourceContext,
        changes: &[RoleChange],
        invites: &[RoleInvite],
    ) -> Result<RoleAssignmentResult, RoleError> {
        let entity = self.resolve_entity(ctx).await?;
        let target = self.write_target(tenant).await?;
        let allowed = self.allowed_roles(&entity);
        let mut result = RoleAssignmentResult::default();

        for change in changes {
            self.assign_user(&mut result, &target, &entity, &allowed, &change.user_id, &change.roles)
                .await;
        }

        for invite in invites {
            let email = invite.email.trim();
            if let Err(e) = self.invites.ensure_access(email, ctx).await {
                warn!(error = %e, "invite failed");
                result.errors.push(format!("invite for {email}: {e}"));
            }
            // Tuples are written even without an invite so access works on first login.
            self.assign_user(&mut result, &target, &entity, &allowed, email, &invite.roles)
                .await;
        }

        result.success = result.errors.is_empty();
        info!(
            assigned = result.assigned_count,
            errors = result.errors.len(),
            "role assignment finished"
        );
        Ok(result)
    }

    async fn assign_user(
        &self,
        result: &mut RoleAssignmentResult,
        target: &WriteTarget,
        entity: &EntityRef,
        allowed: &HashSet<String>,
        user: &str,
        roles: &[String],
    ) {
        for role in roles {
            if !allowed.contains(role) {
                let err = DomainError::RoleNotAllowed {
                    role: role.clone(),
                    group_resource: entity.group_resource(),
                };
                result.errors.push(err.to_string());
                continue;
            }

            let pair = [
                entity.assignee_tuple(user, role),
                entity.permission_tuple(role),
            ];
            for tuple in pair {
                let shown = tuple.to_string();
                match self.write_tuple(target, tuple).await {
                    WriteClassification::Success => result.assigned_count += 1,
                    WriteClassification::AlreadyExists => {
                        debug!(tuple = %shown, "tuple already exists");
                        result.assigned_count += 1;
                    }
                    WriteClassification::Fatal(e) => {
                        result
                            .errors
                            .push(format!("failed to assign role '{role}' to {user}: {e}"));
                        break;
                    }
                }
            }
        }
    }

    /// Removes one role from a user, reporting whether it was held.
    #[instrument(skip(self, tenant, ctx), fields(org = %tenant.organization))]
    pub async fn remove_role(
        &self,
        tenant: &TenantContext,
        ctx: &ResourceContext,
        user_id: &str,
        role: &str,
    ) -> Result<RoleRemovalResult, RoleError> {
        let entity = self.resolve_entity(ctx).await?;
        if !self.allowed_roles(&entity).contains(role) {
            let err = DomainError::RoleNotAllowed {
                role: role.to_string(),
                group_resource: entity.group_resource(),
            };
            return Ok(RoleRemovalResult {
                success: false,
                was_assigned: false,
                error: Some(err.to_string()),
            });
        }

        let target = self.write_target(tenant).await?;
        let tuple = entity.assignee_tuple(user_id, role);

        let probe = ReadRequest {
            store_id: target.store_id.clone(),
            filter: ReadFilter {
                user: Some(tuple.user.clone()),
                relation: Some(tuple.relation.clone()),
                object: Some(tuple.object.clone()),
            },
            page_size: 1,
            continuation_token: None,
        };
        let exists = match self.engine().read(probe).await {
            Ok(page) => !page.tuples.is_empty(),
            Err(e) => {
                return Ok(RoleRemovalResult {
                    success: false,
                    was_assigned: false,
                    error: Some(format!("failed to read role assignment: {e}")),
                })
            }
        };

        if !exists {
            debug!(%user_id, role, "role not assigned, nothing to remove");
            return Ok(RoleRemovalResult {
                success: true,
                was_assigned: false,
                error: None,
            });
        }

        match self.delete_tuple(&target, tuple).await {
            WriteClassification::Fatal(e) => Ok(RoleRemovalResult {
                success: false,
                was_assigned: true,
                error: Some(format!("failed to remove role '{role}': {e}")),
            }),
            _ => Ok(RoleRemovalResult {
                success: true,
                was_assigned: true,
                error: None,
            }),
        }
    }

    /// Deletes the user's assignee tuple for every catalog role of the entity.
    ///
    /// No existence probe is made; absent tuples count as removed. Returns
    /// the number of roles processed.
    #[instrument(skip(self, tenant, entity), fields(org = %tenant.organization, entity = %entity.object()))]
    pub async fn remove_from_entity(
        &self,
        tenant: &TenantContext,
        entity: &EntityRef,
        user_id: &str,
    ) -> Result<usize, RoleError> {
        let target = self.write_target(tenant).await?;
        let roles = self.catalog.role_definitions(&entity.group, &entity.kind);

        for role in &roles {
            if let WriteClassification::Fatal(e) = self
                .delete_tuple(&target, entity.assignee_tuple(user_id, &role.id))
                .await
            {
                return Err(RoleError::Engine(e));
            }
        }
        Ok(roles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{fixture, tenant, ACCOUNT_PATH};
    use super::*;
    use rolegate_domain::error::EngineError;
    use rolegate_storage::{EngineOp, WorkspaceOp};

    fn deployment() -> ResourceContext {
        ResourceContext::new("apps", "Deployment", "d1", ACCOUNT_PATH)
    }

    fn change(user: &str, roles: &[&str]) -> RoleChange {
        RoleChange {
            user_id: user.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_two_roles_issue_four_writes() {
        let f = fixture();

        let result = f
            .manager
            .assign_roles(&tenant(), &deployment(), &[change("alice", &["owner", "member"])], &[])
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.assigned_count, 4);
        assert!(result.errors.is_empty());
        assert_eq!(f.engine.call_count(EngineOp::Write), 4);

        assert!(f.engine.contains(
            &f.store_id,
            &TupleKey::new("user:alice", "assignee", "role:apps_deployment/c2/d1/owner")
        ));
        assert!(f.engine.contains(
            &f.store_id,
            &TupleKey::new(
                "role:apps_deployment/c2/d1/owner#assignee",
                "owner",
                "apps_deployment:c2/d1"
            )
        ));
    }

    #[tokio::test]
    async fn test_duplicate_assignment_is_success() {
        let f = fixture();
        let changes = [change("alice", &["owner"])];
        f.manager
            .assign_roles(&tenant(), &deployment(), &changes, &[])
            .await
            .unwrap();

        let again = f
            .manager
            .assign_roles(&tenant(), &deployment(), &changes, &[])
            .await
            .unwrap();

        assert!(again.success);
        assert_eq!(again.assigned_count, 2);
        assert!(again.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected_without_write() {
        let f = fixture();

        let result = f
            .manager
            .assign_roles(&tenant(), &deployment(), &[change("alice", &["admin", "member"])], &[])
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("admin"));
        assert!(result.errors[0].contains("not allowed"));
        assert_eq!(result.assigned_count, 2);
        assert_eq!(f.engine.call_count(EngineOp::Write), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_recorded_and_batch_continues() {
        let f = fixture();
        f.engine.fail_writes_for(
            "/d1/owner",
            EngineError::Transport {
                message: "boom".to_string(),
            },
        );

        let result = f
            .manager
            .assign_roles(
                &tenant(),
                &deployment(),
                &[change("alice", &["owner", "member"]), change("bob", &["member"])],
                &[],
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("owner"));
        assert_eq!(result.assigned_count, 4);
    }

    #[tokio::test]
    async fn test_invite_creates_record_and_writes_tuples() {
        let f = fixture();
        let invites = [RoleInvite {
            email: "new@example.com".to_string(),
            roles: vec!["member".to_string()],
        }];

        let result = f
            .manager
            .assign_roles(&tenant(), &deployment(), &[], &invites)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.assigned_count, 2);
        assert_eq!(f.workspace.call_count(WorkspaceOp::Create), 1);
        assert!(f.engine.contains(
            &f.store_id,
            &TupleKey::new(
                "user:new@example.com",
                "assignee",
                "role:apps_deployment/c2/d1/member"
            )
        ));
    }

    #[tokio::test]
    async fn test_invite_failure_counts_as_error_but_tuples_are_written() {
        let f = fixture();
        f.workspace.fail(
            WorkspaceOp::Create,
            rolegate_domain::WorkspaceError::Transport {
                message: "forbidden".to_string(),
            },
        );
        let invites = [RoleInvite {
            email: "new@example.com".to_string(),
            roles: vec!["member".to_string()],
        }];

        let result = f
            .manager
            .assign_roles(&tenant(), &deployment(), &[], &invites)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("new@example.com"));
        assert_eq!(result.assigned_count, 2);
    }

    #[tokio::test]
    async fn test_known_user_invite_skips_record() {
        let f = fixture();
        f.identity.add_user(rolegate_domain::IdentityUser {
            id: "u-1".to_string(),
            email: "known@example.com".to_string(),
        });
        let invites = [RoleInvite {
            email: "known@example.com".to_string(),
            roles: vec!["owner".to_string()],
        }];

        let result = f
            .manager
            .assign_roles(&tenant(), &deployment(), &[], &invites)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(f.workspace.call_count(WorkspaceOp::Create), 0);
    }

    #[tokio::test]
    async fn test_remove_unassigned_role_issues_no_delete() {
        let f = fixture();

        let result = f
            .manager
            .remove_role(&tenant(), &deployment(), "alice", "owner")
            .await
            .unwrap();

        assert_eq!(
            result,
            RoleRemovalResult {
                success: true,
                was_assigned: false,
                error: None
            }
        );
        assert_eq!(f.engine.call_count(EngineOp::Write), 0);
        assert_eq!(f.engine.call_count(EngineOp::Read), 1);
    }

    #[tokio::test]
    async fn test_remove_assigned_role() {
        let f = fixture();
        f.manager
            .assign_roles(&tenant(), &deployment(), &[change("alice", &["owner"])], &[])
            .await
            .unwrap();

        let result = f
            .manager
            .remove_role(&tenant(), &deployment(), "alice", "owner")
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.was_assigned);
        assert!(!f.engine.contains(
            &f.store_id,
            &TupleKey::new("user:alice", "assignee", "role:apps_deployment/c2/d1/owner")
        ));
    }

    #[tokio::test]
    async fn test_remove_delete_failure_keeps_was_assigned() {
        let f = fixture();
        f.manager
            .assign_roles(&tenant(), &deployment(), &[change("alice", &["owner"])], &[])
            .await
            .unwrap();
        f.engine.fail(
            EngineOp::Write,
            EngineError::Transport {
                message: "down".to_string(),
            },
        );

        let result = f
            .manager
            .remove_role(&tenant(), &deployment(), "alice", "owner")
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.was_assigned);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_remove_invalid_role() {
        let f = fixture();
        let result = f
            .manager
            .remove_role(&tenant(), &deployment(), "alice", "admin")
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not allowed"));
        assert_eq!(f.engine.call_count(EngineOp::Read), 0);
    }

    #[tokio::test]
    async fn test_remove_from_entity_tolerates_absent_tuples() {
        let f = fixture();
        f.manager
            .assign_roles(&tenant(), &deployment(), &[change("alice", &["member"])], &[])
            .await
            .unwrap();
        let entity = f.manager.resolve_entity(&deployment()).await.unwrap();

        let removed = f
            .manager
            .remove_from_entity(&tenant(), &entity, "alice")
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert!(!f.engine.contains(
            &f.store_id,
            &TupleKey::new("user:alice", "assignee", "role:apps_deployment/c2/d1/member")
        ));
    }

    #[tokio::test]
    async fn test_account_roles_use_origin_cluster() {
        let f = fixture();
        let account = ResourceContext::account("team-a", ACCOUNT_PATH);

        let result = f
            .manager
            .assign_roles(&tenant(), &account, &[change("alice", &["owner"])], &[])
            .await
            .unwrap();

        assert!(result.success);
        assert!(f.engine.contains(
            &f.store_id,
            &TupleKey::new(
                "user:alice",
                "assignee",
                "role:core_platform-mesh_io_account/c2/team-a/owner"
            )
        ));
    }
}
