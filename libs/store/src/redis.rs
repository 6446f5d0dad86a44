//! Redis-backed state store
//!
//! Run state and retry counters live under a configurable key prefix, so a
//! mediator deployment can share a Redis instance with other applications
//! without key collisions.

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};

use crate::traits::{StateStore, StoreError};

/// Configuration for the Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Server URL
    pub url: String,

    /// Connection pool size
    pub max_connections: usize,

    /// Prefix applied to every key this store touches
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://localhost:6379"),
            max_connections: 16,
            key_prefix: String::from("ensemble:"),
        }
    }
}

/// State store persisting run state and retry counters in Redis
pub struct RedisStateStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStateStore {
    /// Create a store backed by a fresh connection pool
    pub fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.max_connections));
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Wrap an existing pool
    #[must_use]
    pub fn from_pool(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(self.namespaced(key), value).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_namespace_the_mediator() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.key_prefix, "ensemble:");
    }

    #[test]
    fn test_keys_are_namespaced() {
        // Pool creation is lazy; no server is contacted here
        let pool = Config::from_url("redis://localhost:6379")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        let store = RedisStateStore::from_pool(pool, "ensemble:");

        assert_eq!(store.namespaced("wf-1"), "ensemble:wf-1");
        assert_eq!(store.namespaced("wf-1:Reserve"), "ensemble:wf-1:Reserve");
    }
}
