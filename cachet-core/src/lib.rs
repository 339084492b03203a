//! Cachet Core - Shared Types
//!
//! Pure data structures with no I/O: identifiers, cache keys, entry
//! envelopes, queries, configuration, clocks and errors. Every other crate
//! in the workspace depends on this one.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod query;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    CacheSettings, CounterCacheConfig, EntityCacheConfig, QueryCacheConfig, TagConfig,
    DEFAULT_DEBOUNCE_WINDOW_SECS, DEFAULT_LOOKUP_BATCH_SIZE, DEFAULT_READ_BATCH_SIZE,
};
pub use entry::CacheEntry;
pub use error::{
    CachetError, CachetResult, CodecError, ConfigError, LookupError, QueryError, StoreError,
};
pub use key::{CacheKey, KEY_SEPARATOR};
pub use query::Query;

/// Integer identifier of a cached entity.
pub type EntityId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// De-duplicate ids, keeping the first occurrence of each.
pub fn dedup_ids(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
