//! Pool registry.
//!
//! A [`PoolRegistry`] owns every pool a process creates, keyed by the
//! configuration's canonical key. At most one pool exists per key. Pools are
//! built lazily, so registering never waits on the network.

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::DbConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One registered pool.
#[derive(Debug)]
struct PoolEntry {
    key: String,
    config: DbConfig,
    pool: DbPool,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Registration order is preserved; `end_pools` closes in this order.
    entries: Vec<PoolEntry>,
    default_config: Option<DbConfig>,
}

impl RegistryState {
    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    /// Resolve an explicit or implicit configuration to a registered entry.
    fn resolve(&self, config: Option<&DbConfig>) -> DbResult<&PoolEntry> {
        match config.or(self.default_config.as_ref()) {
            Some(config) => self
                .position(&config.canonical_key())
                .map(|idx| &self.entries[idx])
                .ok_or_else(|| config.not_found()),
            None => match self.entries.as_slice() {
                [only] => Ok(only),
                entries => Err(DbError::ambiguous_default(entries.len())),
            },
        }
    }
}

/// Registry of connection pools, shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl PoolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool for `config` unless one with the same canonical key exists.
    ///
    /// The pool connects lazily; this never fails.
    pub async fn create_pool(&self, config: &DbConfig) {
        let key = config.canonical_key();
        let mut state = self.state.write().await;
        if state.position(&key).is_some() {
            debug!(pool_key = %key, "Pool already registered");
            return;
        }

        let pool = DbPool::connect_lazy(config);
        state.entries.push(PoolEntry {
            key: key.clone(),
            config: config.clone(),
            pool,
        });
        info!(
            pool_key = %key,
            db_type = %config.db_type,
            pools = state.entries.len(),
            "Registered pool"
        );
    }

    /// Resolve a configuration to its pool.
    ///
    /// Without a configuration, the default configuration is used if set;
    /// otherwise the only registered pool is returned.
    pub async fn get_pool(&self, config: Option<&DbConfig>) -> DbResult<DbPool> {
        let state = self.state.read().await;
        state.resolve(config).map(|entry| entry.pool.clone())
    }

    /// Resolve a configuration to its canonical key and pool.
    pub(crate) async fn resolve(&self, config: Option<&DbConfig>) -> DbResult<(String, DbPool)> {
        let state = self.state.read().await;
        state
            .resolve(config)
            .map(|entry| (entry.key.clone(), entry.pool.clone()))
    }

    /// Remove the pool for `config` and close it.
    ///
    /// Closing waits for lent connections to be returned.
    pub async fn end_pool(&self, config: &DbConfig) -> DbResult<()> {
        let key = config.canonical_key();
        let entry = {
            let mut state = self.state.write().await;
            let idx = state.position(&key).ok_or_else(|| config.not_found())?;
            state.entries.remove(idx)
        }; // Lock released here

        entry.pool.close().await;
        info!(pool_key = %entry.key, "Pool ended");
        Ok(())
    }

    /// Remove and close every pool in registration order.
    ///
    /// Returns the number of pools closed.
    pub async fn end_pools(&self) -> usize {
        let entries: Vec<PoolEntry> = {
            let mut state = self.state.write().await;
            state.entries.drain(..).collect()
        };

        let count = entries.len();
        for entry in entries {
            entry.pool.close().await;
            debug!(pool_key = %entry.key, "Pool ended");
        }
        info!(pools = count, "All pools ended");
        count
    }

    /// Number of registered pools.
    pub async fn internal_num_pools(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Canonical keys of registered pools, in registration order.
    pub async fn list_pools(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Whether a pool with the canonical key of `config` is registered.
    pub async fn contains(&self, config: &DbConfig) -> bool {
        let key = config.canonical_key();
        self.state.read().await.position(&key).is_some()
    }

    /// Configurations of registered pools, in registration order.
    pub async fn configs(&self) -> Vec<DbConfig> {
        let state = self.state.read().await;
        state.entries.iter().map(|entry| entry.config.clone()).collect()
    }

    /// Use `config` whenever no configuration is passed.
    pub async fn set_default_config(&self, config: DbConfig) {
        info!(pool_key = %config.canonical_key(), "Default configuration set");
        self.state.write().await.default_config = Some(config);
    }

    pub async fn clear_default_config(&self) {
        self.state.write().await.default_config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn pg(database: &str) -> DbConfig {
        DbConfig::postgres("localhost", 5432, "app", "secret", database)
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = PoolRegistry::new();
        assert_eq!(registry.internal_num_pools().await, 0);
        assert!(registry.list_pools().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_pool_dedups_equivalent_configs() {
        let registry = PoolRegistry::new();
        registry.create_pool(&pg("orders")).await;
        // Different password, same key
        registry
            .create_pool(&DbConfig::postgres("localhost", 5432, "app", "other", "orders"))
            .await;
        assert_eq!(registry.internal_num_pools().await, 1);

        registry.create_pool(&pg("orders").with_ssl(true)).await;
        assert_eq!(registry.internal_num_pools().await, 2);
        registry.end_pools().await;
    }

    #[tokio::test]
    async fn test_get_pool_not_found() {
        let registry = PoolRegistry::new();
        registry.create_pool(&pg("orders")).await;
        let err = registry.get_pool(Some(&pg("missing"))).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound { ref database, port: 5432, .. } if database == "missing"
        ));
        registry.end_pools().await;
    }

    #[tokio::test]
    async fn test_get_pool_implicit() {
        let registry = PoolRegistry::new();
        assert!(matches!(
            registry.get_pool(None).await,
            Err(DbError::AmbiguousDefault { registered: 0 })
        ));

        registry.create_pool(&pg("orders")).await;
        let pool = registry.get_pool(None).await.unwrap();
        assert_eq!(pool.db_type(), DatabaseType::PostgreSQL);

        registry.create_pool(&pg("billing")).await;
        assert!(matches!(
            registry.get_pool(None).await,
            Err(DbError::AmbiguousDefault { registered: 2 })
        ));
        registry.end_pools().await;
    }

    #[tokio::test]
    async fn test_default_config_takes_precedence() {
        let registry = PoolRegistry::new();
        registry.create_pool(&pg("orders")).await;
        registry.set_default_config(pg("billing")).await;

        // Default set but not registered
        assert!(matches!(
            registry.get_pool(None).await,
            Err(DbError::NotFound { .. })
        ));

        registry.create_pool(&pg("billing")).await;
        let (key, _) = registry.resolve(None).await.unwrap();
        assert_eq!(key, pg("billing").canonical_key());

        registry.clear_default_config().await;
        assert!(matches!(
            registry.get_pool(None).await,
            Err(DbError::AmbiguousDefault { registered: 2 })
        ));
        registry.end_pools().await;
    }

    #[tokio::test]
    async fn test_end_pool() {
        let registry = PoolRegistry::new();
        registry.create_pool(&pg("orders")).await;
        registry.create_pool(&pg("billing")).await;

        let pool = registry.get_pool(Some(&pg("orders"))).await.unwrap();
        registry.end_pool(&pg("orders")).await.unwrap();
        assert!(pool.is_closed());
        assert!(!registry.contains(&pg("orders")).await);
        assert!(registry.contains(&pg("billing")).await);

        assert!(matches!(
            registry.end_pool(&pg("orders")).await,
            Err(DbError::NotFound { .. })
        ));
        registry.end_pools().await;
    }

    #[tokio::test]
    async fn test_end_pools_in_registration_order() {
        let registry = PoolRegistry::new();
        for name in ["a", "b", "c"] {
            registry.create_pool(&pg(name)).await;
        }
        assert_eq!(
            registry.list_pools().await,
            vec![
                "app:localhost:5432:a".to_string(),
                "app:localhost:5432:b".to_string(),
                "app:localhost:5432:c".to_string(),
            ]
        );

        let handles: Vec<DbPool> = {
            let mut out = Vec::new();
            for name in ["a", "b", "c"] {
                out.push(registry.get_pool(Some(&pg(name))).await.unwrap());
            }
            out
        };

        assert_eq!(registry.end_pools().await, 3);
        assert_eq!(registry.internal_num_pools().await, 0);
        assert!(handles.iter().all(DbPool::is_closed));
        assert_eq!(registry.end_pools().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = PoolRegistry::new();
        let other = registry.clone();
        registry.create_pool(&pg("orders")).await;
        assert_eq!(other.internal_num_pools().await, 1);
        assert_eq!(other.configs().await[0].database, "orders");
        other.end_pools().await;
    }
}
