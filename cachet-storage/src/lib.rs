//! Cachet Storage - Cache-Aside Layer
//!
//! Store abstraction, codecs and the cache components built on them. The
//! in-memory [`MemoryStore`] backs tests and single-process use; a Redis
//! backend is available behind the `redis` feature.

pub mod cache;
pub mod codec;
pub mod packed;
pub mod store;

pub use cache::{
    parse_counter, tracing_sink, BatchEntityCache, CacheEvent, CacheEventSink, CacheStats,
    CacheableEntity, CounterCache, CounterSource, EntityLookup, EntityMapView, FanoutEventSink,
    QueryCache, QueryExecutor, ResultAppender, ResultSet, RunOptions, SharedEventSink,
    StatsEventSink, TagRegistry, TracingEventSink,
};
pub use codec::{Codec, JsonCodec};
pub use packed::PackedStore;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{KeyValueStore, MemoryStore, StoreOpCounts};
