//! Observability for cache components.
//!
//! Components never log directly; they report [`CacheEvent`]s to the
//! [`CacheEventSink`] they were built with. [`TracingEventSink`] turns events
//! into `tracing` records, [`StatsEventSink`] aggregates them into
//! [`CacheStats`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something observable that happened inside a cache component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A query result was served from cache.
    QueryHit { key: String },
    /// A query was executed and its result cached.
    QueryMiss { key: String, rows: usize },
    /// A query ran with a zero TTL and skipped the cache.
    QueryBypass,
    /// Result of partitioning one `fetch`.
    EntityPartition {
        root_key: String,
        hits: usize,
        misses: usize,
        tombstoned: usize,
        debounced: usize,
        suppressed: usize,
    },
    /// One call into the lookup collaborator.
    LookupBatch {
        root_key: String,
        ids: usize,
        found: usize,
        force: bool,
    },
    /// Entries written after a lookup.
    WriteBack {
        root_key: String,
        positive: usize,
        tombstones: usize,
    },
    /// Debounce markers written by a bust.
    EntityBust { root_key: String, ids: usize },
    /// Entries rewritten or removed by a forced refresh.
    EntityRefresh {
        root_key: String,
        refreshed: usize,
        removed: usize,
    },
    /// Keys registered under tags.
    Tagged { key: String, tags: usize },
    /// Tag sets busted together with their member keys.
    TagsBusted { tags: usize, keys: usize },
    CounterHit { key: String },
    CounterMiss { key: String, value: i64 },
    CounterIncrement { key: String, amount: i64 },
    CounterClear { key: String },
}

/// Receives events from cache components.
pub trait CacheEventSink: Send + Sync + fmt::Debug {
    fn record(&self, event: &CacheEvent);
}

/// Shared sink handle passed to components.
pub type SharedEventSink = Arc<dyn CacheEventSink>;

/// Default sink: emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl CacheEventSink for TracingEventSink {
    fn record(&self, event: &CacheEvent) {
        match event {
            CacheEvent::QueryHit { key } => tracing::debug!(key = %key, "Query cache hit"),
            CacheEvent::QueryMiss { key, rows } => {
                tracing::debug!(key = %key, rows, "Query cache miss, result stored")
            }
            CacheEvent::QueryBypass => tracing::trace!("Query cache bypassed"),
            CacheEvent::EntityPartition {
                root_key,
                hits,
                misses,
                tombstoned,
                debounced,
                suppressed,
            } => tracing::debug!(
                root_key = %root_key,
                hits,
                misses,
                tombstoned,
                debounced,
                suppressed,
                "Entity cache partitioned"
            ),
            CacheEvent::LookupBatch {
                root_key,
                ids,
                found,
                force,
            } => tracing::debug!(root_key = %root_key, ids, found, force, "Entity lookup batch"),
            CacheEvent::WriteBack {
                root_key,
                positive,
                tombstones,
            } => tracing::debug!(
                root_key = %root_key,
                positive,
                tombstones,
                "Entity cache write-back"
            ),
            CacheEvent::EntityBust { root_key, ids } => {
                tracing::info!(root_key = %root_key, ids, "Entity cache busted")
            }
            CacheEvent::EntityRefresh {
                root_key,
                refreshed,
                removed,
            } => tracing::info!(
                root_key = %root_key,
                refreshed,
                removed,
                "Entity cache refreshed"
            ),
            CacheEvent::Tagged { key, tags } => tracing::trace!(key = %key, tags, "Key tagged"),
            CacheEvent::TagsBusted { tags, keys } => {
                tracing::info!(tags, keys, "Cache tags busted")
            }
            CacheEvent::CounterHit { key } => tracing::trace!(key = %key, "Counter cache hit"),
            CacheEvent::CounterMiss { key, value } => {
                tracing::debug!(key = %key, value, "Counter cache miss, populated")
            }
            CacheEvent::CounterIncrement { key, amount } => {
                tracing::trace!(key = %key, amount, "Counter incremented")
            }
            CacheEvent::CounterClear { key } => tracing::debug!(key = %key, "Counter cleared"),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from cache (positive entries, query results, counters).
    pub hits: u64,
    /// Reads that went to the source of truth.
    pub misses: u64,
    /// Reads answered by a not-found tombstone.
    pub tombstone_hits: u64,
    /// Misses caused by a debounce marker.
    pub debounced: u64,
    /// Calls into a lookup collaborator.
    pub lookups: u64,
    /// Entries written (positive values, tombstones, markers).
    pub writes: u64,
    /// Keys deleted by refreshes and tag busts.
    pub deletes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Tombstone hits count as hits.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.tombstone_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Sink that aggregates events into [`CacheStats`].
#[derive(Debug, Default)]
pub struct StatsEventSink {
    hits: AtomicU64,
    misses: AtomicU64,
    tombstone_hits: AtomicU64,
    debounced: AtomicU64,
    lookups: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl StatsEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current totals.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            tombstone_hits: self.tombstone_hits.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

impl CacheEventSink for StatsEventSink {
    fn record(&self, event: &CacheEvent) {
        match event {
            CacheEvent::QueryHit { .. } | CacheEvent::CounterHit { .. } => Self::add(&self.hits, 1),
            CacheEvent::QueryMiss { .. } | CacheEvent::CounterMiss { .. } => {
                Self::add(&self.misses, 1);
                Self::add(&self.writes, 1);
            }
            CacheEvent::QueryBypass => Self::add(&self.misses, 1),
            CacheEvent::EntityPartition {
                hits,
                misses,
                tombstoned,
                debounced,
                ..
            } => {
                Self::add(&self.hits, *hits);
                Self::add(&self.misses, *misses);
                Self::add(&self.tombstone_hits, *tombstoned);
                Self::add(&self.debounced, *debounced);
            }
            CacheEvent::LookupBatch { .. } => Self::add(&self.lookups, 1),
            CacheEvent::WriteBack {
                positive,
                tombstones,
                ..
            } => Self::add(&self.writes, positive + tombstones),
            CacheEvent::EntityBust { ids, .. } => Self::add(&self.writes, *ids),
            CacheEvent::EntityRefresh {
                refreshed, removed, ..
            } => {
                Self::add(&self.writes, *refreshed);
                Self::add(&self.deletes, *removed);
            }
            CacheEvent::TagsBusted { keys, .. } => Self::add(&self.deletes, *keys),
            CacheEvent::CounterClear { .. } => Self::add(&self.deletes, 1),
            CacheEvent::Tagged { .. } | CacheEvent::CounterIncrement { .. } => {}
        }
    }
}

/// Forwards every event to several sinks in order.
#[derive(Debug, Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<SharedEventSink>,
}

impl FanoutEventSink {
    /// Forward to `sinks`.
    pub fn new(sinks: Vec<SharedEventSink>) -> Self {
        Self { sinks }
    }

    /// Add another sink.
    pub fn with(mut self, sink: SharedEventSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl CacheEventSink for FanoutEventSink {
    fn record(&self, event: &CacheEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

/// Default sink handle.
pub fn tracing_sink() -> SharedEventSink {
    Arc::new(TracingEventSink)
}
