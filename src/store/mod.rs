//! Window store abstraction and implementations.
//!
//! The window store is the single source of truth for per-identity counts.
//! Every operation must be atomic with respect to the others for the same
//! key; the rate limiter performs no client-side locking.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisStore, RedisStoreConfig};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to a window store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to store: {0}")]
    Connection(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Store command failed: {0}")]
    Command(String),
    #[error("Store does not support {0}")]
    Unsupported(&'static str),
}

/// Counter state returned by the atomic increment-or-create primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Count after this request was recorded
    pub count: u64,
    /// Seconds until the counter expires, if the store reported one
    pub ttl_secs: Option<u64>,
}

/// Capability interface over a shared counter store.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Current count for `key`, or `None` if it was never created or has expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Create or overwrite the counter with `value`, expiring after `ttl_secs`.
    ///
    /// Value and expiry are written together; the key is never observable
    /// without its TTL.
    async fn set_with_ttl(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError>;

    /// Add one to an existing counter and return the new value.
    ///
    /// Returns `None` without creating anything if the key does not exist.
    async fn increment(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Seconds remaining before `key` expires, or `None` if it does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Whether [`increment_or_create`](Self::increment_or_create) is a single
    /// atomic operation on this store.
    fn supports_atomic_increment(&self) -> bool {
        false
    }

    /// Increment the counter, creating it with `ttl_secs` if absent, in one
    /// atomic step.
    async fn increment_or_create(
        &self,
        _key: &str,
        _ttl_secs: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        Err(StoreError::Unsupported("atomic increment-or-create"))
    }
}
