//! Tag registry for bulk invalidation.
//!
//! A tag is a store-side set of cache keys. Busting a tag deletes every member
//! key and then the set itself, so bulk invalidation never needs a
//! store-wide scan.
//!
//! A `tag` racing a `bust` of the same tag either lands before the set is
//! deleted (and is wiped with it) or after (and survives until the next
//! bust). Tags speed up invalidation; they are not a consistency primitive.

use std::sync::Arc;

use cachet_core::{CacheKey, CachetResult, TagConfig};

use super::events::{tracing_sink, CacheEvent, SharedEventSink};
use crate::store::KeyValueStore;

/// Maps invalidation tags to the cache keys they protect.
#[derive(Clone)]
pub struct TagRegistry {
    store: Arc<dyn KeyValueStore>,
    config: TagConfig,
    events: SharedEventSink,
}

impl TagRegistry {
    /// Create a registry over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, config: TagConfig, events: SharedEventSink) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    /// Registry with the default `tag` prefix, logging through `tracing`.
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, TagConfig::default(), tracing_sink())
    }

    /// The settings this registry was built with.
    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    fn set_key(&self, tag: &str) -> CacheKey {
        CacheKey::tag_set(&self.config.prefix, tag)
    }

    /// Register `key` under each of `tags`. Missing tag sets are created.
    pub async fn tag<S>(&self, key: &CacheKey, tags: &[S]) -> CachetResult<()>
    where
        S: AsRef<str> + Sync,
    {
        for tag in tags {
            self.store.sadd(&self.set_key(tag.as_ref()), key.as_str()).await?;
        }
        if !tags.is_empty() {
            self.events.record(&CacheEvent::Tagged {
                key: key.to_string(),
                tags: tags.len(),
            });
        }
        Ok(())
    }

    /// Delete every key registered under each of `tags`, then the tag sets.
    ///
    /// Returns the number of member keys that were still present. Busting an
    /// unknown or empty tag is a no-op.
    pub async fn bust<S>(&self, tags: &[S]) -> CachetResult<u64>
    where
        S: AsRef<str> + Sync,
    {
        let mut removed = 0;
        for tag in tags {
            let set_key = self.set_key(tag.as_ref());
            let members: Vec<CacheKey> = self
                .store
                .smembers(&set_key)
                .await?
                .into_iter()
                .map(CacheKey::from_raw)
                .collect();

            if !members.is_empty() {
                removed += self.store.delete(&members).await?;
            }
            self.store.delete(std::slice::from_ref(&set_key)).await?;
        }

        self.events.record(&CacheEvent::TagsBusted {
            tags: tags.len(),
            keys: removed as usize,
        });
        Ok(removed)
    }

    /// Keys currently registered under `tag`.
    pub async fn members(&self, tag: &str) -> CachetResult<Vec<CacheKey>> {
        Ok(self
            .store
            .smembers(&self.set_key(tag))
            .await?
            .into_iter()
            .map(CacheKey::from_raw)
            .collect())
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn registry() -> (TagRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TagRegistry::with_defaults(store.clone()), store)
    }

    #[tokio::test]
    async fn test_tag_creates_set_implicitly() {
        let (tags, store) = registry();
        let key = CacheKey::from_raw("q:abc");

        tags.tag(&key, &["users", "orgs"]).await.unwrap();

        assert_eq!(tags.members("users").await.unwrap(), vec![key.clone()]);
        assert_eq!(tags.members("orgs").await.unwrap(), vec![key]);
        assert!(store.contains(&CacheKey::from_raw("tag:users")));
    }

    #[tokio::test]
    async fn test_bust_removes_members_then_set() {
        let (tags, store) = registry();
        let ttl = Duration::from_secs(60);
        let k1 = CacheKey::from_raw("q:k1");
        let k2 = CacheKey::from_raw("q:k2");
        let other = CacheKey::from_raw("q:other");
        for key in [&k1, &k2, &other] {
            store.set_ex(key, b"[]".to_vec(), ttl).await.unwrap();
        }
        tags.tag(&k1, &["T"]).await.unwrap();
        tags.tag(&k2, &["T"]).await.unwrap();
        tags.tag(&other, &["U"]).await.unwrap();

        let removed = tags.bust(&["T"]).await.unwrap();

        assert_eq!(removed, 2);
        assert!(!store.contains(&k1));
        assert!(!store.contains(&k2));
        assert!(store.contains(&other));
        assert!(!store.contains(&CacheKey::from_raw("tag:T")));
        assert!(tags.members("T").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bust_unknown_tag_is_noop() {
        let (tags, _store) = registry();
        assert_eq!(tags.bust(&["nothing"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bust_counts_only_live_members() {
        let (tags, store) = registry();
        let live = CacheKey::from_raw("q:live");
        store
            .set_ex(&live, b"[]".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        tags.tag(&live, &["T"]).await.unwrap();
        // Member whose entry already expired or was never written.
        tags.tag(&CacheKey::from_raw("q:gone"), &["T"]).await.unwrap();

        assert_eq!(tags.bust(&["T"]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (tags, store) = registry();
        store.set_unavailable(true);
        let err = tags.bust(&["T"]).await.unwrap_err();
        assert!(err.is_store_failure());
    }
}
