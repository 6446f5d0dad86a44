//! Ensemble State Store - persistent key-value state for workflow runs
//!
//! Run state and retry counters are round-tripped as JSON strings under
//! opaque keys. The store contract is deliberately narrow: per-key atomic
//! `set`, `get`-or-not-found, and opaque key issuance. No cross-key
//! transactions are offered, so callers treat each `set` as the commit
//! point for whatever invariant it establishes.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryStateStore;
pub use redis::{RedisConfig, RedisStateStore};
pub use traits::{StateStore, StoreError};
