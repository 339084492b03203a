//! Cache-aside components over a shared key-value store.
//!
//! Every component reads the store first and falls through to a collaborator
//! supplied by the caller on a miss:
//!
//! - [`QueryCache`] caches query results keyed by a content hash of the
//!   statement and its parameters.
//! - [`BatchEntityCache`] caches entities by id in bulk, with not-found
//!   tombstones and post-invalidation debouncing.
//! - [`CounterCache`] caches one integer per id and increments it atomically.
//! - [`TagRegistry`] groups keys under tags for bulk invalidation.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//! let users = BatchEntityCache::new(
//!     PackedStore::json(store.clone()),
//!     Arc::new(UserLookup::new(pool)),
//!     EntityCacheConfig::new("user"),
//! );
//!
//! let found = users.fetch(&[1, 2, 3]).await?;
//! users.bust(&[2]).await?;
//! ```
//!
//! Components hold no state of their own beyond configuration; every clone
//! talks to the same store.

pub mod batch;
pub mod counter;
pub mod events;
pub mod query;
pub mod tags;

pub use batch::{
    BatchEntityCache, CacheableEntity, EntityLookup, EntityMapView, ResultAppender, ResultSet,
};
pub use counter::{parse_counter, CounterCache, CounterSource};
pub use events::{
    tracing_sink, CacheEvent, CacheEventSink, CacheStats, FanoutEventSink, SharedEventSink,
    StatsEventSink, TracingEventSink,
};
pub use query::{QueryCache, QueryExecutor, RunOptions};
pub use tags::TagRegistry;
