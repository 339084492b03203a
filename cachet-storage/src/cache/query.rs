//! Query result cache.
//!
//! Results of parameterized read queries are cached under
//! `<namespace>[:<version>]:<sha256(query)>`. An empty result is cached like
//! any other, so "no rows" is served from cache instead of re-querying.

use std::time::Duration;

use async_trait::async_trait;
use cachet_core::{CacheKey, CachetResult, Query, QueryCacheConfig};
use serde::{de::DeserializeOwned, Serialize};

use super::events::{CacheEvent, SharedEventSink};
use super::tags::TagRegistry;
use crate::codec::{Codec, JsonCodec};
use crate::packed::PackedStore;

/// Executes parameterized statements against the data store.
#[async_trait]
pub trait QueryExecutor<R>: Send + Sync {
    async fn execute(&self, query: &Query) -> CachetResult<Vec<R>>;
}

/// Per-run options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// TTL for this result; `None` uses the configured default, zero skips
    /// the cache entirely.
    pub ttl: Option<Duration>,
    /// Overrides the configured namespace version.
    pub version: Option<String>,
    /// Tags to register the cache key under after a miss.
    pub tags: Vec<String>,
}

impl RunOptions {
    /// Options that use the configured TTL and version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run straight against the data store without touching the cache.
    pub fn bypass() -> Self {
        Self::new().with_ttl(Duration::ZERO)
    }

    /// Set the TTL for this run. Zero bypasses the cache.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Override the configured version for this run.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Register the cache key under `tag` on a miss.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether this run skips the cache.
    pub fn is_bypass(&self) -> bool {
        self.ttl == Some(Duration::ZERO)
    }
}

/// Read-through cache for query results.
pub struct QueryCache<C: Codec = JsonCodec> {
    store: PackedStore<C>,
    tags: TagRegistry,
    config: QueryCacheConfig,
    events: SharedEventSink,
}

impl<C: Codec> QueryCache<C> {
    /// Create a query cache writing through `store` and tagging with `tags`.
    pub fn new(
        store: PackedStore<C>,
        tags: TagRegistry,
        config: QueryCacheConfig,
        events: SharedEventSink,
    ) -> Self {
        Self {
            store,
            tags,
            config,
            events,
        }
    }

    /// The settings this cache was built with.
    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    /// The tag registry keys are registered with.
    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Key a query's result is cached under. `version` falls back to the
    /// configured version.
    pub fn cache_key(&self, query: &Query, version: Option<&str>) -> CacheKey {
        let version = version.or(self.config.version.as_deref());
        CacheKey::query(&self.config.namespace, version, &query.content_hash())
    }

    /// Run `query`, serving the result from cache when present.
    ///
    /// On a miss the result (even an empty one) is stored with the run's TTL
    /// and registered under `options.tags`.
    pub async fn run<R, E>(
        &self,
        executor: &E,
        query: &Query,
        options: &RunOptions,
    ) -> CachetResult<Vec<R>>
    where
        R: Serialize + DeserializeOwned + Send + Sync,
        E: QueryExecutor<R> + ?Sized,
    {
        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        if ttl.is_zero() {
            self.events.record(&CacheEvent::QueryBypass);
            return executor.execute(query).await;
        }

        let key = self.cache_key(query, options.version.as_deref());
        if let Some(rows) = self.store.get::<Vec<R>>(&key).await? {
            self.events.record(&CacheEvent::QueryHit {
                key: key.to_string(),
            });
            return Ok(rows);
        }

        let rows = executor.execute(query).await?;
        self.store.set(&key, &rows, ttl).await?;
        if !options.tags.is_empty() {
            self.tags.tag(&key, &options.tags).await?;
        }

        self.events.record(&CacheEvent::QueryMiss {
            key: key.to_string(),
            rows: rows.len(),
        });
        Ok(rows)
    }

    /// Drop the cached result of `query`. Returns whether an entry existed.
    pub async fn invalidate(&self, query: &Query, version: Option<&str>) -> CachetResult<bool> {
        let key = self.cache_key(query, version);
        Ok(self.store.raw().delete(std::slice::from_ref(&key)).await? > 0)
    }
}

impl<C: Codec> Clone for QueryCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tags: self.tags.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::TracingEventSink;
    use crate::store::MemoryStore;
    use cachet_core::{CachetError, QueryError};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: i64,
        name: String,
    }

    // Mock executor for testing
    struct MockExecutor {
        rows: Vec<Row>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockExecutor {
        fn returning(rows: Vec<Row>) -> Self {
            Self {
                rows,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor<Row> for MockExecutor {
        async fn execute(&self, _query: &Query) -> CachetResult<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(QueryError::ExecutionFailed {
                    reason: "boom".to_string(),
                }
                .into());
            }
            Ok(self.rows.clone())
        }
    }

    fn cache(config: QueryCacheConfig) -> (QueryCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let events: SharedEventSink = Arc::new(TracingEventSink);
        let tags = TagRegistry::new(store.clone(), Default::default(), events.clone());
        let cache = QueryCache::new(PackedStore::json(store.clone()), tags, config, events);
        (cache, store)
    }

    fn row(id: i64) -> Row {
        Row {
            id,
            name: format!("row-{id}"),
        }
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let (cache, _store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1), row(2)]);
        let query = Query::new("SELECT * FROM t WHERE x = $1").bind(5);

        let first: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();
        let second: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_cached() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![]);
        let query = Query::new("SELECT * FROM t WHERE false");

        let first: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();
        let second: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();

        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(executor.calls(), 1);
        assert!(store.contains(&cache.cache_key(&query, None)));
    }

    #[tokio::test]
    async fn test_zero_ttl_bypasses_cache() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1)]);
        let query = Query::new("SELECT 1");

        for _ in 0..3 {
            let rows: Vec<Row> = cache.run(&executor, &query, &RunOptions::bypass()).await.unwrap();
            assert_eq!(rows, vec![row(1)]);
        }

        assert_eq!(executor.calls(), 3);
        assert_eq!(store.op_counts().get, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_ttl_overrides_default() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1)]);
        let query = Query::new("SELECT 1");
        let options = RunOptions::new().with_ttl(Duration::from_secs(42));

        let _: Vec<Row> = cache.run(&executor, &query, &options).await.unwrap();

        let ttl = store.ttl(&cache.cache_key(&query, None)).flatten().unwrap();
        assert!(ttl <= Duration::from_secs(42) && ttl > Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_versions_are_isolated() {
        let (cache, _store) = cache(QueryCacheConfig::new("q").with_version("v1"));
        let executor = MockExecutor::returning(vec![row(1)]);
        let query = Query::new("SELECT 1");

        let _: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();
        let _: Vec<Row> = cache
            .run(&executor, &query, &RunOptions::new().with_version("v2"))
            .await
            .unwrap();

        assert_eq!(executor.calls(), 2);
        assert!(cache.cache_key(&query, None).as_str().starts_with("q:v1:"));
    }

    #[tokio::test]
    async fn test_tags_registered_on_miss() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1)]);
        let query = Query::new("SELECT 1");
        let options = RunOptions::new().with_tag("users");

        let _: Vec<Row> = cache.run(&executor, &query, &options).await.unwrap();
        let key = cache.cache_key(&query, None);
        assert_eq!(cache.tags().members("users").await.unwrap(), vec![key.clone()]);

        cache.tags().bust(&["users"]).await.unwrap();
        assert!(!store.contains(&key));

        let _: Vec<Row> = cache.run(&executor, &query, &options).await.unwrap();
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_single_query() {
        let (cache, _store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1)]);
        let query = Query::new("SELECT 1");

        let _: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();
        assert!(cache.invalidate(&query, None).await.unwrap());
        assert!(!cache.invalidate(&query, None).await.unwrap());

        let _: Vec<Row> = cache.run(&executor, &query, &RunOptions::new()).await.unwrap();
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_executor_failure_propagates_and_caches_nothing() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor {
            fail: true,
            ..MockExecutor::returning(vec![])
        };
        let query = Query::new("SELECT 1");

        let err = cache
            .run::<Row, _>(&executor, &query, &RunOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CachetError::Query(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_fails_the_run() {
        let (cache, store) = cache(QueryCacheConfig::new("q"));
        let executor = MockExecutor::returning(vec![row(1)]);
        store.set_unavailable(true);

        let err = cache
            .run::<Row, _>(&executor, &Query::new("SELECT 1"), &RunOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_store_failure());
        assert_eq!(executor.calls(), 0);
    }
}
