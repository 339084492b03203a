//! Counter cache.
//!
//! One integer per id, stored bare under `<root_key>:<id>` as decimal text so
//! the store's atomic increment can operate on it. Values are populated
//! lazily from an optional [`CounterSource`].
//!
//! A cached zero cannot be told apart from a miss: reading a zero asks the
//! source again every time.

use std::sync::Arc;

use async_trait::async_trait;
use cachet_core::{CacheKey, CachetResult, CounterCacheConfig, EntityId, StoreError};

use super::events::{tracing_sink, CacheEvent, SharedEventSink};
use crate::store::KeyValueStore;

/// Authoritative count for an id.
#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn count(&self, id: EntityId) -> CachetResult<i64>;
}

/// Parse a stored counter value.
pub fn parse_counter(key: &CacheKey, bytes: &[u8]) -> CachetResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            StoreError::NotAnInteger {
                key: key.to_string(),
            }
            .into()
        })
}

/// Lazily populated integer counters.
#[derive(Clone)]
pub struct CounterCache {
    store: Arc<dyn KeyValueStore>,
    source: Option<Arc<dyn CounterSource>>,
    config: CounterCacheConfig,
    events: SharedEventSink,
}

impl CounterCache {
    /// Counters with no source; a miss populates zero.
    pub fn new(store: Arc<dyn KeyValueStore>, config: CounterCacheConfig) -> Self {
        Self {
            store,
            source: None,
            config,
            events: tracing_sink(),
        }
    }

    /// Populate misses from `source`.
    pub fn with_source(mut self, source: Arc<dyn CounterSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the sink cache events are recorded to.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// The settings this cache was built with.
    pub fn config(&self) -> &CounterCacheConfig {
        &self.config
    }

    /// Key the counter for `id` is stored under.
    pub fn key(&self, id: EntityId) -> CacheKey {
        CacheKey::entity(&self.config.root_key, id)
    }

    /// Current value for `id`, populating the cache on a miss (or a zero).
    pub async fn get(&self, id: EntityId) -> CachetResult<i64> {
        let key = self.key(id);
        if let Some(bytes) = self.store.get(&key).await? {
            let value = parse_counter(&key, &bytes)?;
            if value != 0 {
                self.events.record(&CacheEvent::CounterHit {
                    key: key.to_string(),
                });
                return Ok(value);
            }
        }

        let value = match &self.source {
            Some(source) => source.count(id).await?,
            None => 0,
        };
        self.store
            .set_ex(&key, value.to_string().into_bytes(), self.config.ttl())
            .await?;

        self.events.record(&CacheEvent::CounterMiss {
            key: key.to_string(),
            value,
        });
        Ok(value)
    }

    /// Add `amount` to the counter for `id`.
    ///
    /// The counter is populated first if needed. The returned value is the
    /// value read before incrementing plus `amount`; a concurrent increment
    /// landing between the read and the increment is applied but not
    /// reflected, so treat the result as advisory. A sum that overflows
    /// `i64` fails with [`StoreError::NotAnInteger`] before the store is
    /// touched.
    pub async fn increment_by(&self, id: EntityId, amount: i64) -> CachetResult<i64> {
        let previous = self.get(id).await?;
        let key = self.key(id);
        let next = previous
            .checked_add(amount)
            .ok_or_else(|| StoreError::NotAnInteger {
                key: key.to_string(),
            })?;
        self.store.incr_by(&key, amount).await?;

        self.events.record(&CacheEvent::CounterIncrement {
            key: key.to_string(),
            amount,
        });
        Ok(next)
    }

    /// Add one to the counter for `id`.
    pub async fn increment(&self, id: EntityId) -> CachetResult<i64> {
        self.increment_by(id, 1).await
    }

    /// Drop the cached value for `id`. The next `get` asks the source.
    pub async fn clear(&self, id: EntityId) -> CachetResult<()> {
        let key = self.key(id);
        self.store.delete(std::slice::from_ref(&key)).await?;
        self.events.record(&CacheEvent::CounterClear {
            key: key.to_string(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for CounterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterCache")
            .field("config", &self.config)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}
