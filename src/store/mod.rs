// =============================================================================
// External stores — counter and cache protocols
// =============================================================================
//
// The pipeline never holds quota or cache state itself; it talks to these two
// narrow protocols.  `redis` backs them with a shared Redis client, `memory`
// with in-process maps for single-node runs and tests.
//
// Every call made by the pipeline goes through `with_timeout`, so a stalled
// backend surfaces as `StoreError::Timeout` instead of a hung request.
// =============================================================================

pub mod memory;
pub mod redis;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use memory::{MemoryCacheStore, MemoryCounterStore};
pub use redis::RedisStore;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Atomic per-key counters with expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` (absent counts as 0) and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Expire `key` after `ttl`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Increment `key` and (re)set its expiry in one call.  A failed expiry
    /// is logged and the count still returned; the next increment sets it
    /// again.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let count = self.incr(key).await?;
        if let Err(e) = self.expire(key, ttl).await {
            warn!(key = %key, error = %e, "failed to set counter expiry");
        }
        Ok(count)
    }
}

/// Byte values with a per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;
}

/// Bound a store call by `limit`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
