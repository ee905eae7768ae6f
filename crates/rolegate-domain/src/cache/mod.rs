//! Store and authorization-model id cache.
//!
//! Uses Moka's async Cache with a small fixed capacity, LRU eviction and a
//! time-to-live. Entries are never invalidated explicitly: a stale id
//! surfaces as a failing Check or Write downstream, and disappears once the
//! TTL expires.
//!
//! # Key Design
//!
//! Keys are `store-{org}` and `model-{org}` so both ids of one organization
//! share the same bounded cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use rolegate_domain::cache::{StoreCache, StoreCacheConfig};
//!
//! let cache = StoreCache::new(StoreCacheConfig::default());
//! cache.insert_store_id("acme", "01HV...").await;
//! assert_eq!(cache.store_id("acme").await.as_deref(), Some("01HV..."));
//! ```

use std::time::Duration;

use moka::future::Cache;
use moka::policy::EvictionPolicy;

/// Configuration for the store/model cache.
#[derive(Debug, Clone)]
pub struct StoreCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// Time-to-live of each entry.
    pub ttl: Duration,
}

impl Default for StoreCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10,
            ttl: Duration::from_secs(300),
        }
    }
}

impl StoreCacheConfig {
    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Concurrency-safe cache of organization → store id / model id.
///
/// Owned by whoever constructs the service and shared by handle; there is
/// no process-global instance.
pub struct StoreCache {
    cache: Cache<String, String>,
    config: StoreCacheConfig,
}

impl std::fmt::Debug for StoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

fn store_key(org: &str) -> String {
    format!("store-{org}")
}

fn model_key(org: &str) -> String {
    format!("model-{org}")
}

impl StoreCache {
    /// Creates a new cache with the given configuration.
    pub fn new(config: StoreCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { cache, config }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &StoreCacheConfig {
        &self.config
    }

    /// Cached store id for an organization.
    pub async fn store_id(&self, org: &str) -> Option<String> {
        self.lookup(store_key(org)).await
    }

    /// Caches the store id for an organization, replacing any previous value.
    pub async fn insert_store_id(&self, org: &str, store_id: impl Into<String>) {
        self.cache.insert(store_key(org), store_id.into()).await;
    }

    /// Cached authorization model id for an organization.
    pub async fn model_id(&self, org: &str) -> Option<String> {
        self.lookup(model_key(org)).await
    }

    /// Caches the model id for an organization, replacing any previous value.
    pub async fn insert_model_id(&self, org: &str, model_id: impl Into<String>) {
        self.cache.insert(model_key(org), model_id.into()).await;
    }

    /// Records cache hit/miss to `rolegate_cache_hits_total` and
    /// `rolegate_cache_misses_total`.
    async fn lookup(&self, key: String) -> Option<String> {
        let result = self.cache.get(&key).await;
        if result.is_some() {
            metrics::counter!("rolegate_cache_hits_total").increment(1);
        } else {
            metrics::counter!("rolegate_cache_misses_total").increment(1);
        }
        result
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks. Useful for testing eviction.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreCacheConfig::default();
        assert_eq!(config.max_capacity, 10);
        assert_eq!(config.ttl, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_store_and_model_ids_are_independent() {
        let cache = StoreCache::new(StoreCacheConfig::default());

        cache.insert_store_id("acme", "store-1").await;
        assert_eq!(cache.store_id("acme").await.as_deref(), Some("store-1"));
        assert_eq!(cache.model_id("acme").await, None);

        cache.insert_model_id("acme", "model-1").await;
        assert_eq!(cache.model_id("acme").await.as_deref(), Some("model-1"));
    }

    #[tokio::test]
    async fn test_insert_overwrites() {
        let cache = StoreCache::new(StoreCacheConfig::default());

        cache.insert_store_id("acme", "old").await;
        cache.insert_store_id("acme", "new").await;

        assert_eq!(cache.store_id("acme").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = StoreCache::new(
            StoreCacheConfig::default().with_ttl(Duration::from_millis(50)),
        );

        cache.insert_store_id("acme", "store-1").await;
        assert!(cache.store_id("acme").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.run_pending_tasks().await;

        assert_eq!(cache.store_id("acme").await, None);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = StoreCache::new(StoreCacheConfig::default().with_max_capacity(2));

        for org in ["a", "b", "c", "d"] {
            cache.insert_store_id(org, format!("store-{org}")).await;
        }
        cache.run_pending_tasks().await;

        assert!(cache.entry_count() <= 2);
    }
}
