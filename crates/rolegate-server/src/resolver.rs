//! Store and authorization-model resolution.
//!
//! Maps an organization to the id of its policy-engine store (the store
//! whose name equals the organization) and to the store's newest
//! authorization model. Successful lookups are cached; a second call within
//! the TTL issues no upstream request.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use rolegate_domain::error::EngineError;
use rolegate_domain::traits::PolicyEngine;
use rolegate_domain::StoreCache;

/// Errors resolving store or model ids.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No store is named after the organization.
    #[error("store for organization '{org}' not found")]
    StoreNotFound { org: String },

    /// The store has no authorization model.
    #[error("no authorization model in store '{store_id}'")]
    NoAuthorizationModel { store_id: String },

    /// The policy engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Resolves and caches store/model ids per organization.
pub struct StoreResolver<E> {
    engine: Arc<E>,
    cache: Arc<StoreCache>,
}

impl<E> Clone for StoreResolver<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<E: PolicyEngine> StoreResolver<E> {
    pub fn new(engine: Arc<E>, cache: Arc<StoreCache>) -> Self {
        Self { engine, cache }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<StoreCache> {
        &self.cache
    }

    /// Id of the store named `org`.
    #[instrument(skip(self))]
    pub async fn get_store_id(&self, org: &str) -> Result<String, ResolverError> {
        if let Some(id) = self.cache.store_id(org).await {
            debug!(store_id = %id, "store id cache hit");
            return Ok(id);
        }

        let stores = self.engine.list_stores().await?;
        let store = stores
            .into_iter()
            .find(|s| s.name == org)
            .ok_or_else(|| ResolverError::StoreNotFound {
                org: org.to_string(),
            })?;

        self.cache.insert_store_id(org, store.id.clone()).await;
        Ok(store.id)
    }

    /// Id of the newest authorization model of `org`'s store.
    #[instrument(skip(self))]
    pub async fn get_model_id(&self, org: &str) -> Result<String, ResolverError> {
        if let Some(id) = self.cache.model_id(org).await {
            debug!(model_id = %id, "model id cache hit");
            return Ok(id);
        }

        let store_id = self.get_store_id(org).await?;
        let models = self.engine.read_authorization_models(&store_id).await?;
        // Models are returned newest first.
        let model = models
            .into_iter()
            .next()
            .ok_or(ResolverError::NoAuthorizationModel { store_id })?;

        self.cache.insert_model_id(org, model.id.clone()).await;
        Ok(model.id)
    }
}
