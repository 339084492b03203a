//! Batch entity cache.
//!
//! Caches lookups of entities by integer id. A `fetch` reads cached entries in
//! bounded multi-get batches, partitions them, sends every miss to the lookup
//! collaborator in bounded batches, and writes the results back:
//!
//! ```text
//! ids ─ dedup ─ mget (≤ read_batch_size) ─┬─ Positive  ──────────────────────► result
//!                                         ├─ Tombstone ──────────────────────► (excluded)
//!                                         ├─ Debounced ─┐
//!                                         └─ absent ────┴─ lookup (≤ lookup_batch_size)
//!                                                           ├─ found ─ set_ex ─► result
//!                                                           └─ absent ─ set_nx + expire
//! ```
//!
//! A `bust` overwrites entries with short-lived debounce markers. While a
//! marker is younger than the debounce window, fetched values for that id are
//! returned but not cached, which damps churn on entities that are updated
//! repeatedly in quick succession.
//!
//! Tombstones are written with set-if-not-exists so a negative result can
//! never clobber a value another caller cached in the meantime. The store's
//! set-if-not-exists takes no expiry, so the TTL is applied with a second
//! command; a crash between the two leaves a tombstone without expiry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cachet_core::{
    dedup_ids, system_clock, CacheEntry, CacheKey, CachetResult, EntityCacheConfig, EntityId,
    SharedClock, Timestamp,
};
use futures_util::future::{try_join, try_join_all};
use serde::{de::DeserializeOwned, Serialize};

use super::events::{tracing_sink, CacheEvent, SharedEventSink};
use crate::codec::{Codec, JsonCodec};
use crate::packed::PackedStore;

/// Marker trait for types that can be cached by [`BatchEntityCache`].
///
/// Blanket-implemented for every type meeting the bounds.
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheableEntity for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Bulk lookup against the source of truth.
///
/// Ids absent from the returned map are treated as not found. `force` is set
/// by [`BatchEntityCache::refresh`] so implementations can skip any read
/// cache of their own.
#[async_trait]
pub trait EntityLookup<T>: Send + Sync {
    async fn lookup(&self, ids: &[EntityId], force: bool) -> CachetResult<HashMap<EntityId, T>>;
}

/// Entities returned by a fetch, in request order, with their ids.
pub type ResultSet<T> = Vec<(EntityId, T)>;

/// Post-processing step run on every fetch result, e.g. to join related data.
#[async_trait]
pub trait ResultAppender<T>: Send + Sync {
    async fn append(&self, results: &mut ResultSet<T>) -> CachetResult<()>;
}

/// Outcome of reading one batch of ids from the cache.
#[derive(Debug)]
struct Partition<T> {
    found: HashMap<EntityId, T>,
    misses: Vec<EntityId>,
    /// Misses behind a debounce marker that is still inside the window.
    suppressed: HashSet<EntityId>,
    tombstoned: usize,
    debounced: usize,
}

impl<T> Partition<T> {
    fn new() -> Self {
        Self {
            found: HashMap::new(),
            misses: Vec::new(),
            suppressed: HashSet::new(),
            tombstoned: 0,
            debounced: 0,
        }
    }
}

/// Read-through cache of entities by id.
pub struct BatchEntityCache<T, C = JsonCodec>
where
    T: CacheableEntity,
    C: Codec,
{
    store: PackedStore<C>,
    lookup: Arc<dyn EntityLookup<T>>,
    appender: Option<Arc<dyn ResultAppender<T>>>,
    config: EntityCacheConfig,
    clock: SharedClock,
    events: SharedEventSink,
}

impl<T, C> BatchEntityCache<T, C>
where
    T: CacheableEntity,
    C: Codec,
{
    /// Create a cache over `store` that resolves misses with `lookup`.
    pub fn new(
        store: PackedStore<C>,
        lookup: Arc<dyn EntityLookup<T>>,
        config: EntityCacheConfig,
    ) -> Self {
        Self {
            store,
            lookup,
            appender: None,
            config,
            clock: system_clock(),
            events: tracing_sink(),
        }
    }

    /// Run `appender` on every fetch result before returning it.
    pub fn with_appender(mut self, appender: Arc<dyn ResultAppender<T>>) -> Self {
        self.appender = Some(appender);
        self
    }

    /// Set the clock used to stamp entries and evaluate the debounce window.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the sink cache events are recorded to.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// The settings this cache was built with.
    pub fn config(&self) -> &EntityCacheConfig {
        &self.config
    }

    /// Key the entry for `id` is stored under.
    pub fn key(&self, id: EntityId) -> CacheKey {
        CacheKey::entity(&self.config.root_key, id)
    }

    /// Map-shaped view over this cache.
    pub fn as_map(&self) -> EntityMapView<T, C> {
        EntityMapView::new(self.clone())
    }

    /// Fetch the entities for `ids`, in the order the ids were first given.
    ///
    /// Ids that do not exist are left out of the result.
    pub async fn fetch(&self, ids: &[EntityId]) -> CachetResult<Vec<T>> {
        Ok(self
            .fetch_entries(ids)
            .await?
            .into_iter()
            .map(|(_, entity)| entity)
            .collect())
    }

    /// Fetch a single entity.
    pub async fn fetch_one(&self, id: EntityId) -> CachetResult<Option<T>> {
        Ok(self
            .fetch_entries(&[id])
            .await?
            .into_iter()
            .find(|(found, _)| *found == id)
            .map(|(_, entity)| entity))
    }

    /// Fetch `ids`, keeping each entity paired with its id.
    pub async fn fetch_entries(&self, ids: &[EntityId]) -> CachetResult<ResultSet<T>> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut partition = self.read_cached(&ids).await?;
        let mut looked_up = self.lookup_batches(&partition.misses, false).await?;
        self.write_back(&partition, &looked_up).await?;

        let mut results = Vec::with_capacity(partition.found.len() + looked_up.len());
        for id in &ids {
            if let Some(entity) = partition.found.remove(id) {
                results.push((*id, entity));
            } else if let Some(entity) = looked_up.remove(id) {
                results.push((*id, entity));
            }
        }

        if let Some(appender) = &self.appender {
            appender.append(&mut results).await?;
        }
        Ok(results)
    }

    /// Invalidate `ids` and open their debounce window.
    ///
    /// Each entry is replaced by a debounce marker that expires after the
    /// window, so fetches in the meantime go to the source but do not
    /// re-cache what they find.
    pub async fn bust(&self, ids: &[EntityId]) -> CachetResult<()> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let window = self.config.debounce_window();
        try_join_all(ids.iter().map(|id| {
            let key = self.key(*id);
            let marker = CacheEntry::<T>::debounced(*id, now);
            async move { self.store.set(&key, &marker, window).await }
        }))
        .await?;

        self.events.record(&CacheEvent::EntityBust {
            root_key: self.config.root_key.clone(),
            ids: ids.len(),
        });
        Ok(())
    }

    /// Reload `ids` from the source, bypassing the cache.
    ///
    /// The lookup is called with `force = true`. Returned entities overwrite
    /// their entries (debounce markers included); entries of ids the lookup
    /// did not return are deleted. Returns the reloaded entities in request
    /// order.
    pub async fn refresh(&self, ids: &[EntityId]) -> CachetResult<Vec<T>> {
        Ok(self
            .refresh_entries(ids)
            .await?
            .into_iter()
            .map(|(_, entity)| entity)
            .collect())
    }

    /// [`refresh`](Self::refresh), keeping each entity paired with its id.
    pub async fn refresh_entries(&self, ids: &[EntityId]) -> CachetResult<ResultSet<T>> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut fresh = self.lookup_batches(&ids, true).await?;
        let now = self.clock.now();

        let (present, absent): (Vec<EntityId>, Vec<EntityId>) =
            ids.iter().copied().partition(|id| fresh.contains_key(id));

        try_join_all(
            present
                .iter()
                .filter_map(|id| fresh.get(id).map(|entity| self.write_positive(*id, entity, now))),
        )
        .await?;

        for chunk in absent.chunks(self.config.read_batch_size.max(1)) {
            let keys: Vec<CacheKey> = chunk.iter().map(|id| self.key(*id)).collect();
            self.store.raw().delete(&keys).await?;
        }

        self.events.record(&CacheEvent::EntityRefresh {
            root_key: self.config.root_key.clone(),
            refreshed: present.len(),
            removed: absent.len(),
        });

        Ok(present
            .into_iter()
            .filter_map(|id| fresh.remove(&id).map(|entity| (id, entity)))
            .collect())
    }

    /// Write known-fresh entities straight into the cache, e.g. right after
    /// the writer persisted them.
    pub async fn prime(&self, entities: &[(EntityId, T)]) -> CachetResult<()> {
        let now = self.clock.now();
        try_join_all(
            entities
                .iter()
                .map(|(id, entity)| self.write_positive(*id, entity, now)),
        )
        .await?;
        Ok(())
    }

    /// Multi-get cached entries in bounded batches and sort them into hits,
    /// misses and tombstones.
    async fn read_cached(&self, ids: &[EntityId]) -> CachetResult<Partition<T>> {
        let now = self.clock.now();
        let window = self.config.debounce_window();
        let mut partition = Partition::new();

        for chunk in ids.chunks(self.config.read_batch_size.max(1)) {
            let keys: Vec<CacheKey> = chunk.iter().map(|id| self.key(*id)).collect();
            let entries = self.store.mget::<CacheEntry<T>>(&keys).await?;

            for (id, entry) in chunk.iter().copied().zip(entries) {
                match entry {
                    Some(CacheEntry::Positive { value, .. }) => {
                        partition.found.insert(id, value);
                    }
                    Some(CacheEntry::Tombstone { .. }) => partition.tombstoned += 1,
                    Some(marker @ CacheEntry::Debounced { .. }) => {
                        partition.debounced += 1;
                        if marker.debounce_active(now, window) {
                            partition.suppressed.insert(id);
                        }
                        partition.misses.push(id);
                    }
                    None => partition.misses.push(id),
                }
            }
        }

        self.events.record(&CacheEvent::EntityPartition {
            root_key: self.config.root_key.clone(),
            hits: partition.found.len(),
            misses: partition.misses.len(),
            tombstoned: partition.tombstoned,
            debounced: partition.debounced,
            suppressed: partition.suppressed.len(),
        });
        Ok(partition)
    }

    /// Call the lookup collaborator in bounded batches and merge the results.
    async fn lookup_batches(
        &self,
        ids: &[EntityId],
        force: bool,
    ) -> CachetResult<HashMap<EntityId, T>> {
        let mut merged = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.lookup_batch_size.max(1)) {
            let batch = self.lookup.lookup(chunk, force).await?;
            self.events.record(&CacheEvent::LookupBatch {
                root_key: self.config.root_key.clone(),
                ids: chunk.len(),
                found: batch.len(),
                force,
            });
            merged.extend(batch);
        }
        Ok(merged)
    }

    /// Cache lookup results for every miss that is not inside a debounce
    /// window.
    async fn write_back(
        &self,
        partition: &Partition<T>,
        looked_up: &HashMap<EntityId, T>,
    ) -> CachetResult<()> {
        let now = self.clock.now();
        let writable = partition
            .misses
            .iter()
            .filter(|id| !partition.suppressed.contains(id));

        let mut positive = Vec::new();
        let mut absent = Vec::new();
        for id in writable {
            match looked_up.get(id) {
                Some(entity) => positive.push(self.write_positive(*id, entity, now)),
                None if self.config.cache_not_found => absent.push(self.write_tombstone(*id, now)),
                None => {}
            }
        }

        if positive.is_empty() && absent.is_empty() {
            return Ok(());
        }

        let written = positive.len();
        let (_, tombstones) = try_join(try_join_all(positive), try_join_all(absent)).await?;

        self.events.record(&CacheEvent::WriteBack {
            root_key: self.config.root_key.clone(),
            positive: written,
            tombstones: tombstones.into_iter().filter(|written| *written).count(),
        });
        Ok(())
    }

    async fn write_positive(&self, id: EntityId, entity: &T, now: Timestamp) -> CachetResult<()> {
        let entry = CacheEntry::positive(id, entity, now);
        self.store.set(&self.key(id), &entry, self.config.ttl()).await
    }

    /// Returns whether the tombstone was written. An existing entry is left
    /// untouched.
    async fn write_tombstone(&self, id: EntityId, now: Timestamp) -> CachetResult<bool> {
        let key = self.key(id);
        let written = self
            .store
            .set_nx(&key, &CacheEntry::<T>::tombstone(id, now))
            .await?;
        if written && !self.store.raw().expire(&key, self.config.ttl()).await? {
            tracing::warn!(key = %key, "Tombstone vanished before its expiry was applied");
        }
        Ok(written)
    }
}

impl<T, C> Clone for BatchEntityCache<T, C>
where
    T: CacheableEntity,
    C: Codec,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lookup: Arc::clone(&self.lookup),
            appender: self.appender.clone(),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
        }
    }
}

/// Map-shaped view of a [`BatchEntityCache`]: fetch results keyed by id.
pub struct EntityMapView<T, C = JsonCodec>
where
    T: CacheableEntity,
    C: Codec,
{
    inner: BatchEntityCache<T, C>,
}

impl<T, C> EntityMapView<T, C>
where
    T: CacheableEntity,
    C: Codec,
{
    /// Wrap `inner`.
    pub fn new(inner: BatchEntityCache<T, C>) -> Self {
        Self { inner }
    }

    /// The wrapped array-shaped cache.
    pub fn inner(&self) -> &BatchEntityCache<T, C> {
        &self.inner
    }

    /// Fetch the entities for `ids`, keyed by id.
    pub async fn fetch(&self, ids: &[EntityId]) -> CachetResult<HashMap<EntityId, T>> {
        Ok(self.inner.fetch_entries(ids).await?.into_iter().collect())
    }

    /// Same as [`BatchEntityCache::bust`].
    pub async fn bust(&self, ids: &[EntityId]) -> CachetResult<()> {
        self.inner.bust(ids).await
    }

    /// Reload `ids` from the lookup, keyed by id.
    pub async fn refresh(&self, ids: &[EntityId]) -> CachetResult<HashMap<EntityId, T>> {
        Ok(self.inner.refresh_entries(ids).await?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::StatsEventSink;
    use crate::store::{KeyValueStore, MemoryStore};
    use cachet_core::{CachetError, Clock, LookupError, ManualClock};
    use serde::Deserialize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: EntityId,
        name: String,
    }

    fn user(id: EntityId) -> User {
        User {
            id,
            name: format!("user-{id}"),
        }
    }

    // Mock source of truth for testing
    #[derive(Default)]
    struct MockLookup {
        rows: Mutex<HashMap<EntityId, User>>,
        calls: Mutex<Vec<(Vec<EntityId>, bool)>>,
        fail: bool,
    }

    impl MockLookup {
        fn with_users(ids: impl IntoIterator<Item = EntityId>) -> Self {
            let lookup = Self::default();
            for id in ids {
                lookup.put(user(id));
            }
            lookup
        }

        fn put(&self, user: User) {
            self.rows.lock().unwrap().insert(user.id, user);
        }

        fn calls(&self) -> Vec<(Vec<EntityId>, bool)> {
            self.calls.lock().unwrap().clone()
        }

        fn requested(&self) -> Vec<EntityId> {
            self.calls().into_iter().flat_map(|(ids, _)| ids).collect()
        }
    }

    #[async_trait]
    impl EntityLookup<User> for MockLookup {
        async fn lookup(
            &self,
            ids: &[EntityId],
            force: bool,
        ) -> CachetResult<HashMap<EntityId, User>> {
            self.calls.lock().unwrap().push((ids.to_vec(), force));
            if self.fail {
                return Err(LookupError::BatchFailed {
                    count: ids.len(),
                    reason: "db down".to_string(),
                }
                .into());
            }
            let rows = self.rows.lock().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| rows.get(id).map(|u| (*id, u.clone())))
                .collect())
        }
    }

    struct Harness {
        cache: BatchEntityCache<User>,
        lookup: Arc<MockLookup>,
        store: Arc<MemoryStore>,
        clock: ManualClock,
    }

    fn harness(lookup: MockLookup, config: EntityCacheConfig) -> Harness {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let store = Arc::new(MemoryStore::with_clock(shared.clone()));
        let lookup = Arc::new(lookup);
        let cache: BatchEntityCache<User> =
            BatchEntityCache::new(PackedStore::json(store.clone()), lookup.clone(), config)
                .with_clock(shared);
        Harness {
            cache,
            lookup,
            store,
            clock,
        }
    }

    fn config() -> EntityCacheConfig {
        EntityCacheConfig::new("user")
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let h = harness(MockLookup::with_users([1, 2, 3]), config());

        let first = h.cache.fetch(&[1, 2, 3]).await.unwrap();
        let second = h.cache.fetch(&[1, 2, 3]).await.unwrap();

        assert_eq!(first, vec![user(1), user(2), user(3)]);
        assert_eq!(first, second);
        assert_eq!(h.lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_results_follow_request_order_and_dedup() {
        let h = harness(MockLookup::with_users([1, 2, 3]), config());
        h.cache.fetch(&[2]).await.unwrap();

        let users = h.cache.fetch(&[3, 2, 3, 1, 2]).await.unwrap();

        assert_eq!(users, vec![user(3), user(2), user(1)]);
        assert_eq!(h.lookup.requested(), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_empty_request_touches_nothing() {
        let h = harness(MockLookup::default(), config());
        assert!(h.cache.fetch(&[]).await.unwrap().is_empty());
        assert_eq!(h.store.op_counts().mget, 0);
        assert!(h.lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entity_is_tombstoned() {
        let h = harness(MockLookup::with_users([1]), config());

        assert_eq!(h.cache.fetch(&[1, 99]).await.unwrap(), vec![user(1)]);
        assert_eq!(h.cache.fetch(&[1, 99]).await.unwrap(), vec![user(1)]);

        assert_eq!(h.lookup.calls().len(), 1);
        let ttl = h.store.ttl(&h.cache.key(99)).flatten().unwrap();
        assert_eq!(ttl, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_not_found_caching_disabled() {
        let h = harness(MockLookup::with_users([1]), config().with_cache_not_found(false));

        h.cache.fetch(&[99]).await.unwrap();
        h.cache.fetch(&[99]).await.unwrap();

        assert_eq!(h.lookup.requested(), vec![99, 99]);
        assert!(!h.store.contains(&h.cache.key(99)));
    }

    #[tokio::test]
    async fn test_tombstone_never_clobbers_existing_entry() {
        let h = harness(MockLookup::default(), config());
        let entry = CacheEntry::positive(7, user(7), h.clock.now());
        // Another writer caches 7 between our read and our tombstone write.
        let key = h.cache.key(7);
        let bytes = serde_json::to_vec(&entry).unwrap();
        assert!(h.store.set_nx(&key, bytes).await.unwrap());

        let written = h.cache.write_tombstone(7, h.clock.now()).await.unwrap();

        assert!(!written);
        assert_eq!(h.cache.fetch(&[7]).await.unwrap(), vec![user(7)]);
        assert_eq!(h.store.op_counts().expire, 0);
    }

    #[tokio::test]
    async fn test_bust_suppresses_recache_inside_window() {
        let h = harness(MockLookup::with_users([5]), config());
        h.cache.fetch(&[5]).await.unwrap();

        h.lookup.put(User {
            id: 5,
            name: "renamed".to_string(),
        });
        h.cache.bust(&[5]).await.unwrap();
        h.clock.advance(Duration::from_secs(3));

        let users = h.cache.fetch(&[5]).await.unwrap();
        assert_eq!(users[0].name, "renamed");

        let marker = h
            .cache
            .store
            .get::<CacheEntry<User>>(&h.cache.key(5))
            .await
            .unwrap()
            .unwrap();
        assert!(marker.is_debounced());

        // Still inside the window: the source is asked again.
        h.cache.fetch(&[5]).await.unwrap();
        assert_eq!(h.lookup.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_recaches_after_window() {
        let h = harness(MockLookup::with_users([5]), config());
        h.cache.bust(&[5]).await.unwrap();
        h.clock.advance(Duration::from_secs(11));

        h.cache.fetch(&[5]).await.unwrap();
        h.cache.fetch(&[5]).await.unwrap();

        assert_eq!(h.lookup.calls().len(), 1);
        let entry = h
            .cache
            .store
            .get::<CacheEntry<User>>(&h.cache.key(5))
            .await
            .unwrap()
            .unwrap();
        assert!(entry.is_positive());
    }

    #[tokio::test]
    async fn test_bust_marker_expires_with_window() {
        let config = config().with_debounce_window(Duration::from_secs(4));
        let h = harness(MockLookup::default(), config);
        h.cache.bust(&[1, 1, 2]).await.unwrap();

        let ttl = h.store.ttl(&h.cache.key(1)).flatten().unwrap();
        assert_eq!(ttl, Duration::from_secs(4));
        assert_eq!(h.store.op_counts().set_ex, 2);
    }

    #[tokio::test]
    async fn test_read_batches_are_bounded() {
        let ids: Vec<EntityId> = (1..=450).collect();
        let h = harness(MockLookup::with_users(ids.clone()), config());

        let users = h.cache.fetch(&ids).await.unwrap();

        assert_eq!(users.len(), 450);
        assert_eq!(h.store.op_counts().mget, 3);
        assert_eq!(h.store.largest_mget(), 200);
    }

    #[tokio::test]
    async fn test_lookup_batches_are_bounded() {
        let ids: Vec<EntityId> = (1..=25).collect();
        let h = harness(
            MockLookup::with_users(ids.clone()),
            config().with_lookup_batch_size(10),
        );

        h.cache.fetch(&ids).await.unwrap();

        let sizes: Vec<usize> = h.lookup.calls().iter().map(|(ids, _)| ids.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_refresh_forces_lookup_and_rewrites() {
        let h = harness(MockLookup::with_users([1, 2]), config());
        h.cache.fetch(&[1, 2]).await.unwrap();
        h.lookup.put(User {
            id: 1,
            name: "fresh".to_string(),
        });
        h.lookup.rows.lock().unwrap().remove(&2);

        let refreshed = h.cache.refresh(&[1, 2]).await.unwrap();

        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].name, "fresh");
        assert_eq!(h.lookup.calls().last().unwrap(), &(vec![1, 2], true));
        assert!(!h.store.contains(&h.cache.key(2)));
        assert_eq!(h.cache.fetch(&[1]).await.unwrap()[0].name, "fresh");
    }

    #[tokio::test]
    async fn test_refresh_overrides_debounce_marker() {
        let h = harness(MockLookup::with_users([3]), config());
        h.cache.bust(&[3]).await.unwrap();

        h.cache.refresh(&[3]).await.unwrap();
        h.cache.fetch(&[3]).await.unwrap();

        // Only the forced lookup; the fetch was a hit.
        assert_eq!(h.lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_prime_then_fetch_skips_lookup() {
        let h = harness(MockLookup::default(), config());
        h.cache.prime(&[(4, user(4))]).await.unwrap();

        assert_eq!(h.cache.fetch_one(4).await.unwrap(), Some(user(4)));
        assert!(h.lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn test_map_view_keys_by_id() {
        let h = harness(MockLookup::with_users([1, 2]), config());
        let view = h.cache.as_map();

        let users = view.fetch(&[2, 1, 9]).await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[&1], user(1));
        assert_eq!(users[&2], user(2));
        assert!(!users.contains_key(&9));
    }

    #[tokio::test]
    async fn test_appender_sees_assembled_results() {
        struct Shout;

        #[async_trait]
        impl ResultAppender<User> for Shout {
            async fn append(&self, results: &mut ResultSet<User>) -> CachetResult<()> {
                for (_, user) in results.iter_mut() {
                    user.name = user.name.to_uppercase();
                }
                Ok(())
            }
        }

        let h = harness(MockLookup::with_users([1]), config());
        let cache = h.cache.clone().with_appender(Arc::new(Shout));

        assert_eq!(cache.fetch(&[1]).await.unwrap()[0].name, "USER-1");
        // The cached copy is untouched.
        assert_eq!(h.cache.fetch(&[1]).await.unwrap()[0].name, "user-1");
    }

    #[tokio::test]
    async fn test_lookup_failure_writes_nothing() {
        let lookup = MockLookup {
            fail: true,
            ..MockLookup::default()
        };
        let h = harness(lookup, config());

        let err = h.cache.fetch(&[1]).await.unwrap_err();

        assert!(matches!(err, CachetError::Lookup(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_fails_fetch() {
        let h = harness(MockLookup::with_users([1]), config());
        h.store.set_unavailable(true);

        let err = h.cache.fetch(&[1]).await.unwrap_err();

        assert!(err.is_store_failure());
        assert!(h.lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_describe_partition() {
        let h = harness(MockLookup::with_users([1]), config());
        let stats = Arc::new(StatsEventSink::new());
        let cache = h.cache.clone().with_events(stats.clone());

        cache.fetch(&[1, 2]).await.unwrap();
        cache.fetch(&[1, 2]).await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.tombstone_hits, 1);
        assert_eq!(snapshot.lookups, 1);
        assert_eq!(snapshot.writes, 2);
    }
}
