//! State store trait definition

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Errors
// =============================================================================

/// Errors from the state store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the connection pool
    #[error("Redis pool creation failed: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// Failed to check out a connection
    #[error("Redis pool checkout failed: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A Redis command failed
    #[error("Redis command failed: {0}")]
    Operation(#[from] deadpool_redis::redis::RedisError),
}

// =============================================================================
// State Store Trait
// =============================================================================

/// Narrow key-value contract the workflow engine persists through
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Issue a globally unique opaque key for a new run
    fn new_key(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Fetch the value stored under `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, overwriting atomically at the key level
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
