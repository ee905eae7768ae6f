//! The permission check pipeline.
//!
//! Stages run strictly in sequence; the first failing stage ends the
//! request. Denials (organization mismatch, failed check, missing resource)
//! stay distinguishable from system errors so the outer layer can render
//! them uniformly.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use rolegate_domain::model::{AccountInfo, EntityRef, ResourceContext, TenantContext};
use rolegate_domain::naming::user_id;
use rolegate_domain::traits::{CheckRequest, PolicyEngine, WorkspaceClient};
use rolegate_domain::{build_contextual_tuples, TupleKey};

use super::context::{IdentityToken, RequestContext};
use super::error::{DenialReason, GateError, Stage};
use crate::deadline::within;
use crate::resolver::StoreResolver;

/// Name of the operation argument holding the resource context.
pub const CONTEXT_ARGUMENT: &str = "context";

/// Guards operations on tenant resources.
pub struct PermissionGate<E, W> {
    resolver: StoreResolver<E>,
    workspace: Arc<W>,
}

impl<E, W> Clone for PermissionGate<E, W> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            workspace: Arc::clone(&self.workspace),
        }
    }
}

/// Extracts and decodes the `context` argument.
pub fn extract_resource_context(args: &Value) -> Result<ResourceContext, GateError> {
    let raw = args
        .get(CONTEXT_ARGUMENT)
        .filter(|v| !v.is_null())
        .ok_or_else(|| GateError::MalformedResourceContext {
            message: format!("missing argument '{CONTEXT_ARGUMENT}'"),
        })?;

    let ctx: ResourceContext =
        serde_json::from_value(raw.clone()).map_err(|e| GateError::MalformedResourceContext {
            message: e.to_string(),
        })?;
    ctx.validate()
        .map_err(|e| GateError::MalformedResourceContext {
            message: e.to_string(),
        })?;
    Ok(ctx)
}

fn record(result: &Result<RequestContext, GateError>, permission: &str) {
    let outcome = match result {
        Ok(_) => "allowed",
        Err(e) => e.outcome(),
    };
    metrics::counter!("rolegate_gate_decisions_total", "outcome" => outcome).increment(1);
    if let Err(e) = result {
        if e.is_denial() {
            debug!(permission, outcome, "request denied");
        } else {
            warn!(permission, outcome, error = %e, "permission check failed");
        }
    }
}

impl<E: PolicyEngine, W: WorkspaceClient> PermissionGate<E, W> {
    pub fn new(resolver: StoreResolver<E>, workspace: Arc<W>) -> Self {
        Self {
            resolver,
            workspace,
        }
    }

    /// Runs the gate and, if it passes, the protected operation.
    pub async fn authorize<F, Fut, T, Err>(
        &self,
        ctx: RequestContext,
        args: &Value,
        permission: &str,
        next: F,
    ) -> Result<T, Err>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
        Err: From<GateError>,
    {
        let ctx = self.check(ctx, args, permission).await?;
        next(ctx).await
    }

    /// Runs every stage up to `Delegate` and returns the augmented context.
    #[instrument(skip(self, ctx, args))]
    pub async fn check(
        &self,
        ctx: RequestContext,
        args: &Value,
        permission: &str,
    ) -> Result<RequestContext, GateError> {
        let result = self.run(ctx, args, permission).await;
        record(&result, permission);
        result
    }

    async fn run(
        &self,
        mut ctx: RequestContext,
        args: &Value,
        permission: &str,
    ) -> Result<RequestContext, GateError> {
        let token = ctx.token.clone().ok_or(GateError::TokenMissing)?;
        let tenant = ctx.tenant.clone().ok_or(GateError::TenantContextMissing)?;
        let resource = extract_resource_context(args)?;
        let deadline = ctx.deadline;

        let account = self.resolve_account_info(&resource, deadline).await?;

        if account.organization_name != tenant.organization {
            debug!(
                account_org = %account.organization_name,
                tenant_org = %tenant.organization,
                "organization mismatch"
            );
            return Err(GateError::Unauthorized {
                reason: DenialReason::OrgMismatch,
            });
        }

        // Accounts are evaluated in their origin cluster.
        let entity = EntityRef::from_context(&resource, &account);

        if !self.resource_exists(&resource, deadline).await? {
            return Err(GateError::ResourceNotFound {
                resource: format!("{}/{}", resource.group_resource(), resource.name()),
            });
        }

        let allowed = self
            .check_permission(&token, &tenant, &resource, &account, &entity, permission, deadline)
            .await?;
        if !allowed {
            return Err(GateError::Unauthorized {
                reason: DenialReason::PermissionDenied,
            });
        }

        ctx.account_info = Some(account);
        Ok(ctx)
    }

    async fn resolve_account_info(
        &self,
        resource: &ResourceContext,
        deadline: Option<Instant>,
    ) -> Result<AccountInfo, GateError> {
        let account_path = resource.account_info_path();
        within(deadline, self.workspace.account_info(&account_path))
            .await
            .map_err(|_| GateError::DeadlineExceeded {
                stage: Stage::ResolveAccountInfo,
            })?
            .map_err(|source| GateError::AccountLookup {
                account_path,
                source,
            })
    }

    async fn resource_exists(
        &self,
        resource: &ResourceContext,
        deadline: Option<Instant>,
    ) -> Result<bool, GateError> {
        let stage = Stage::CheckResourceExists;
        let lookup = async {
            let mapping = self
                .workspace
                .resolve_mapping(&resource.account_path, &resource.group, &resource.kind)
                .await?;
            let namespace = resource.namespace().filter(|_| mapping.namespaced);
            self.workspace
                .get(&resource.account_path, &mapping, namespace, resource.name())
                .await
        };

        match within(deadline, lookup).await {
            Err(_) => Err(GateError::DeadlineExceeded { stage }),
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) if e.is_not_found() => Ok(false),
            Ok(Err(e)) => Err(GateError::upstream(stage, e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_permission(
        &self,
        token: &IdentityToken,
        tenant: &TenantContext,
        resource: &ResourceContext,
        account: &AccountInfo,
        entity: &EntityRef,
        permission: &str,
        deadline: Option<Instant>,
    ) -> Result<bool, GateError> {
        let stage = Stage::CheckPermission;
        let contextual_tuples = build_contextual_tuples(resource, account);

        let store_id = within(deadline, self.resolver.get_store_id(&tenant.organization))
            .await
            .map_err(|_| GateError::DeadlineExceeded { stage })?
            .map_err(|e| GateError::upstream(stage, e))?;

        let request = CheckRequest {
            store_id,
            authorization_model_id: None,
            tuple_key: TupleKey::new(user_id(&token.mail), permission, entity.object()),
            contextual_tuples,
        };
        debug!(tuple = %request.tuple_key, "checking permission");

        within(deadline, self.resolver.engine().check(request))
            .await
            .map_err(|_| GateError::DeadlineExceeded { stage })?
            .map_err(|e| GateError::upstream(stage, e))
    }
}
