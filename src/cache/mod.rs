//! Cache backends for storing API responses
//!
//! Every backend implements the [`Cache`] trait: four operations over opaque
//! string keys and raw byte payloads. What a payload means is up to the caller;
//! backends never inspect it.
//!
//! Available backends:
//! - [`MemoryCache`]: in-process map guarded by a read/write lock
//! - [`FileCache`]: one file per key in an XDG-compliant cache directory
//! - [`RedisCache`]: a single Redis node
//! - [`SentinelCache`]: a Redis master discovered through Sentinel

mod file;
mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileCache;
pub use memory::MemoryCache;
pub use redis_cache::{RedisCache, SentinelCache};

/// Errors that can occur in a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The Redis server rejected a command or could not be reached
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The lock guarding an in-process cache was poisoned by a panicking writer
    #[error("cache lock poisoned")]
    Poisoned,

    /// The operation did not finish within the configured deadline
    #[error("cache {operation} timed out after {timeout:?}")]
    Timeout {
        /// Which cache operation was running
        operation: &'static str,
        /// The deadline that elapsed
        timeout: Duration,
    },
}

/// Storage contract shared by all cache backends
///
/// Implementations own their concurrency guarantees: the same instance is
/// shared across tasks behind an `Arc<dyn Cache>`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the payload stored under `key`, or `None` if there is none
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous payload
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Removes the payload stored under `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every payload
    async fn clear(&self) -> Result<(), CacheError>;
}
