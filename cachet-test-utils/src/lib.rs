//! Cachet Test Utilities
//!
//! Centralized test infrastructure for the Cachet workspace:
//! - Mock collaborators (entity lookup, query executor, counter source)
//! - A recording event sink
//! - Proptest generators for ids, entities and queries
//! - Test fixtures for common scenarios
//! - Custom assertions for Cachet-specific validation

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, Once};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-export the in-memory store from its source crate
pub use cachet_storage::{MemoryStore, StoreOpCounts};

// Re-export core types for convenience
pub use cachet_core::{
    CacheEntry, CacheKey, CacheSettings, CachetError, CachetResult, CodecError, ConfigError,
    CounterCacheConfig, EntityCacheConfig, EntityId, LookupError, ManualClock, Query, QueryError,
    QueryCacheConfig, SharedClock, StoreError, TagConfig, Timestamp,
};
pub use cachet_storage::{
    CacheEvent, CacheEventSink, CounterSource, EntityLookup, QueryExecutor, ResultAppender,
    ResultSet,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// One recorded call into [`MockEntityLookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupCall {
    pub ids: Vec<EntityId>,
    pub force: bool,
}

/// In-memory source of truth for entities, recording every lookup.
#[derive(Debug)]
pub struct MockEntityLookup<T> {
    rows: Mutex<HashMap<EntityId, T>>,
    calls: Mutex<Vec<LookupCall>>,
    failure: Mutex<Option<CachetError>>,
}

impl<T: Clone> MockEntityLookup<T> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn with_rows(rows: impl IntoIterator<Item = (EntityId, T)>) -> Self {
        let lookup = Self::new();
        lock(&lookup.rows).extend(rows);
        lookup
    }

    pub fn put(&self, id: EntityId, row: T) {
        lock(&self.rows).insert(id, row);
    }

    pub fn remove(&self, id: EntityId) -> Option<T> {
        lock(&self.rows).remove(&id)
    }

    /// Make every subsequent lookup fail with `error`.
    pub fn fail_with(&self, error: CachetError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn calls(&self) -> Vec<LookupCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Every id requested, across all calls, in order.
    pub fn requested_ids(&self) -> Vec<EntityId> {
        lock(&self.calls)
            .iter()
            .flat_map(|call| call.ids.iter().copied())
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.calls).iter().map(|call| call.ids.len()).collect()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }
}

impl<T: Clone> Default for MockEntityLookup<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> EntityLookup<T> for MockEntityLookup<T>
where
    T: Clone + Send + Sync,
{
    async fn lookup(&self, ids: &[EntityId], force: bool) -> CachetResult<HashMap<EntityId, T>> {
        lock(&self.calls).push(LookupCall {
            ids: ids.to_vec(),
            force,
        });
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        let rows = lock(&self.rows);
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|row| (*id, row.clone())))
            .collect())
    }
}

/// Query executor returning canned rows and recording executed queries.
#[derive(Debug)]
pub struct MockQueryExecutor<R> {
    rows: Mutex<Vec<R>>,
    executed: Mutex<Vec<Query>>,
    failure: Mutex<Option<CachetError>>,
}

impl<R: Clone> MockQueryExecutor<R> {
    pub fn returning(rows: Vec<R>) -> Self {
        Self {
            rows: Mutex::new(rows),
            executed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn set_rows(&self, rows: Vec<R>) {
        *lock(&self.rows) = rows;
    }

    pub fn fail_with(&self, error: CachetError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn executed(&self) -> Vec<Query> {
        lock(&self.executed).clone()
    }

    pub fn execution_count(&self) -> usize {
        lock(&self.executed).len()
    }
}

#[async_trait]
impl<R> QueryExecutor<R> for MockQueryExecutor<R>
where
    R: Clone + Send + Sync,
{
    async fn execute(&self, query: &Query) -> CachetResult<Vec<R>> {
        lock(&self.executed).push(query.clone());
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        Ok(lock(&self.rows).clone())
    }
}

/// Counter source backed by a map; unknown ids count zero.
#[derive(Debug, Default)]
pub struct MockCounterSource {
    counts: Mutex<HashMap<EntityId, i64>>,
    calls: Mutex<Vec<EntityId>>,
}

impl MockCounterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(counts: impl IntoIterator<Item = (EntityId, i64)>) -> Self {
        let source = Self::new();
        lock(&source.counts).extend(counts);
        source
    }

    pub fn set(&self, id: EntityId, count: i64) {
        lock(&self.counts).insert(id, count);
    }

    pub fn calls(&self) -> Vec<EntityId> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl CounterSource for MockCounterSource {
    async fn count(&self, id: EntityId) -> CachetResult<i64> {
        lock(&self.calls).push(id);
        Ok(lock(&self.counts).get(&id).copied().unwrap_or(0))
    }
}

/// Event sink that keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        lock(&self.events).clone()
    }

    pub fn count(&self, predicate: impl Fn(&CacheEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl CacheEventSink for RecordingEventSink {
    fn record(&self, event: &CacheEvent) {
        lock(&self.events).push(event.clone());
    }
}

// ============================================================================
// FIXTURE TYPES
// ============================================================================

/// Entity used throughout the test suites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUser {
    pub id: EntityId,
    pub name: String,
    /// Filled in by [`TeamAppender`]; never part of the cached value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl TestUser {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
        }
    }
}

/// Appender joining a team name onto each fetched user.
#[derive(Debug, Default)]
pub struct TeamAppender {
    teams: HashMap<EntityId, String>,
    calls: Mutex<usize>,
}

impl TeamAppender {
    pub fn new(teams: impl IntoIterator<Item = (EntityId, String)>) -> Self {
        Self {
            teams: teams.into_iter().collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl ResultAppender<TestUser> for TeamAppender {
    async fn append(&self, results: &mut ResultSet<TestUser>) -> CachetResult<()> {
        *lock(&self.calls) += 1;
        for (id, user) in results.iter_mut() {
            user.team = self.teams.get(id).cloned();
        }
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Cachet inputs.

    use super::*;
    use proptest::prelude::*;

    /// Positive entity ids from a small range so requests overlap.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1i64..500
    }

    /// Id lists with duplicates, possibly empty.
    pub fn arb_id_list(max_len: usize) -> impl Strategy<Value = Vec<EntityId>> {
        prop::collection::vec(arb_entity_id(), 0..max_len)
    }

    pub fn arb_user() -> impl Strategy<Value = TestUser> {
        (arb_entity_id(), "[a-z]{1,12}").prop_map(|(id, name)| TestUser::new(id, name))
    }

    /// A source of truth holding a random subset of ids.
    pub fn arb_user_table() -> impl Strategy<Value = HashMap<EntityId, TestUser>> {
        prop::collection::hash_set(arb_entity_id(), 0..100).prop_map(|ids| {
            ids.into_iter()
                .map(|id| (id, TestUser::new(id, format!("user-{id}"))))
                .collect()
        })
    }

    pub fn arb_query_param() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(serde_json::Value::from),
        ]
    }

    pub fn arb_query() -> impl Strategy<Value = Query> {
        (
            "SELECT [a-z, ]{1,20} FROM [a-z]{1,8}",
            prop::collection::vec(arb_query_param(), 0..4),
        )
            .prop_map(|(text, params)| Query { text, params })
    }

    /// Positive counter increments.
    pub fn arb_increments() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(1i64..50, 1..20)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    pub fn user(id: EntityId) -> TestUser {
        TestUser::new(id, format!("user-{id}"))
    }

    /// Users for every id in `ids`.
    pub fn users(ids: impl IntoIterator<Item = EntityId>) -> Vec<(EntityId, TestUser)> {
        ids.into_iter().map(|id| (id, user(id))).collect()
    }

    /// Lookup pre-populated with `ids`.
    pub fn user_lookup(ids: impl IntoIterator<Item = EntityId>) -> MockEntityLookup<TestUser> {
        MockEntityLookup::with_rows(users(ids))
    }

    /// Entity cache settings with the default batch sizes.
    pub fn user_cache_config() -> EntityCacheConfig {
        EntityCacheConfig::new("user")
    }

    /// A manual clock paired with a store that shares it.
    pub fn store_with_clock() -> (std::sync::Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = MemoryStore::with_clock(std::sync::Arc::new(clock.clone()));
        (std::sync::Arc::new(store), clock)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Cachet results and store state.

    use super::*;

    /// Assert that a CachetResult is a store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_lookup_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Lookup(_)) => {}
            other => panic!("Expected Lookup error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_query_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Query(_)) => {}
            other => panic!("Expected Query error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &Result<T, ConfigError>) {
        assert!(result.is_err(), "Expected ConfigError, got Ok: {:?}", result);
    }

    /// Assert that no `mget` asked for more than `limit` keys.
    #[track_caller]
    pub fn assert_mget_bounded(store: &MemoryStore, limit: u64) {
        let largest = store.largest_mget();
        assert!(
            largest <= limit,
            "mget requested {} keys, limit is {}",
            largest,
            limit
        );
    }

    /// Assert that no lookup call exceeded `limit` ids.
    #[track_caller]
    pub fn assert_lookup_bounded<T: Clone>(lookup: &MockEntityLookup<T>, limit: usize) {
        for size in lookup.batch_sizes() {
            assert!(size <= limit, "lookup batch of {} ids, limit is {}", size, limit);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
