//! Application state for HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use rolegate_domain::traits::{
    IdentityDirectory, PolicyEngine, RoleCatalog, RoleChangeNotifier, WorkspaceClient,
};
use rolegate_domain::StoreCache;
use rolegate_server::{
    InviteManager, InviteTarget, PermissionGate, RoleManager, ServerConfig, StoreResolver,
};

use crate::errors::ErrorConfig;

/// Collaborators the state is assembled from.
pub struct Backends<E, W> {
    pub engine: Arc<E>,
    pub workspace: Arc<W>,
    pub catalog: Arc<dyn RoleCatalog>,
    pub identity: Arc<dyn IdentityDirectory>,
    pub notifier: Arc<dyn RoleChangeNotifier>,
}

/// State shared by all handlers.
///
/// The gate and the role manager share one resolver, so store and model
/// ids resolved by either are cached for both.
pub struct AppState<E, W> {
    pub engine: Arc<E>,
    pub gate: PermissionGate<E, W>,
    pub roles: RoleManager<E, W>,
    pub request_timeout: Duration,
    pub manage_permission: String,
    pub read_permission: String,
    pub errors: ErrorConfig,
}

impl<E: PolicyEngine, W: WorkspaceClient> AppState<E, W> {
    pub fn new(backends: Backends<E, W>, config: &ServerConfig) -> Self {
        let cache = Arc::new(StoreCache::new(config.fga.cache_config()));
        let resolver = StoreResolver::new(Arc::clone(&backends.engine), cache);

        let invites = InviteManager::new(
            backends.identity,
            Arc::clone(&backends.workspace),
            InviteTarget::from(&config.invites),
        );
        let roles = RoleManager::new(
            resolver.clone(),
            Arc::clone(&backends.workspace),
            backends.catalog,
            backends.notifier,
            invites,
        );
        let gate = PermissionGate::new(resolver, backends.workspace);

        Self {
            engine: backends.engine,
            gate,
            roles,
            request_timeout: config.server.request_timeout(),
            manage_permission: config.roles.manage_permission.clone(),
            read_permission: config.roles.read_permission.clone(),
            errors: ErrorConfig {
                detailed_errors: config.server.detailed_errors,
            },
        }
    }
}
