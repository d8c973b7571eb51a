//! signcache Storage - Store adapters
//!
//! The orchestrator talks to a key-value store only through [`CacheStore`]:
//! plain reads and expiring writes, plus paired variants that travel in one
//! round trip so a value and its checksum are read and written together.
//!
//! Adapters move bytes and nothing else. They never interpret values, and
//! they report transport failures as [`StoreError`] so the orchestrator can
//! decide to fail open.

use std::time::Duration;

use async_trait::async_trait;
use signcache_core::StoreError;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A pair of optional values read in one round trip.
pub type ValuePair = (Option<Vec<u8>>, Option<Vec<u8>>);

/// Key-value store with per-key expiry.
///
/// # Consistency
///
/// The paired operations are issued as a single batch. They are only as
/// isolated from concurrent writers as the backing store's batching
/// primitive makes them; no cross-key transaction is assumed.
///
/// # Ownership
///
/// A store is a shared, externally owned resource. Wrapped computations
/// hold it behind an `Arc` and never close or reconnect it.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read one value. `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write one value that expires after `ttl`.
    ///
    /// Returns whether the store acknowledged the write.
    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool>;

    /// Read two values in one round trip.
    async fn get_pair(&self, key_a: &str, key_b: &str) -> StoreResult<ValuePair>;

    /// Write two values with the same expiry in one round trip.
    ///
    /// Returns the acknowledgement of each half separately.
    async fn set_pair_with_expiry(
        &self,
        key_a: &str,
        value_a: &[u8],
        key_b: &str,
        value_b: &[u8],
        ttl: Duration,
    ) -> StoreResult<(bool, bool)>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;
}

/// Whole seconds of a TTL as stores expect them, never less than one.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
