//! Key-value store trait.
//!
//! This is the full set of primitives the cache layer needs from its backing
//! store. Values are opaque bytes; encoding is handled one level up by
//! [`crate::PackedStore`].

use std::time::Duration;

use async_trait::async_trait;
use cachet_core::{CacheKey, CachetResult};

/// Key-value store trait for pluggable cache backends.
///
/// Implementations must be safe for concurrent use from many tasks. Every
/// method is a single round-trip; no method may hold a lock across an await
/// point of its caller.
///
/// # Integer values
///
/// [`KeyValueStore::incr_by`] operates on values stored as ASCII decimal
/// strings, so counters written with [`KeyValueStore::set_ex`] must use that
/// representation.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value at `key`.
    async fn get(&self, key: &CacheKey) -> CachetResult<Option<Vec<u8>>>;

    /// Get several keys in one round-trip. The result has one slot per key,
    /// in request order.
    async fn mget(&self, keys: &[CacheKey]) -> CachetResult<Vec<Option<Vec<u8>>>>;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_ex(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CachetResult<()>;

    /// Set `key` only if it holds no value. Returns whether the write
    /// happened. The entry is written without expiry.
    async fn set_nx(&self, key: &CacheKey, value: Vec<u8>) -> CachetResult<bool>;

    /// Apply an expiry to an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CachetResult<bool>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[CacheKey]) -> CachetResult<u64>;

    /// Atomically add `amount` to the integer at `key` (absent counts as 0)
    /// and return the new value. An existing expiry is preserved.
    async fn incr_by(&self, key: &CacheKey, amount: i64) -> CachetResult<i64>;

    /// Add `member` to the set at `key`, creating it if needed. Returns
    /// whether the member was newly added.
    async fn sadd(&self, key: &CacheKey, member: &str) -> CachetResult<bool>;

    /// Read all members of the set at `key`. Absent sets are empty.
    async fn smembers(&self, key: &CacheKey) -> CachetResult<Vec<String>>;
}
