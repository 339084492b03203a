//! Typed ("packed") access to a raw key-value store.

use std::sync::Arc;
use std::time::Duration;

use cachet_core::{CacheKey, CachetResult, StoreError};
use serde::{de::DeserializeOwned, Serialize};

use crate::codec::{Codec, JsonCodec};
use crate::store::KeyValueStore;

/// A key-value store paired with a codec.
///
/// Components talk to the store through this wrapper so that neither the
/// store client nor the encoding is baked into cache logic.
pub struct PackedStore<C: Codec = JsonCodec> {
    store: Arc<dyn KeyValueStore>,
    codec: C,
}

impl PackedStore<JsonCodec> {
    /// Wrap `store` with the JSON codec.
    pub fn json(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, JsonCodec)
    }
}

impl<C: Codec> PackedStore<C> {
    /// Pair `store` with `codec`.
    pub fn new(store: Arc<dyn KeyValueStore>, codec: C) -> Self {
        Self { store, codec }
    }

    /// The underlying store, for commands that carry no encoded value.
    pub fn raw(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Get and decode the value at `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CachetResult<Option<T>> {
        match self.store.get(key).await? {
            Some(bytes) => self.codec.decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Multi-get and decode. Slots line up with `keys`.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[CacheKey],
    ) -> CachetResult<Vec<Option<T>>> {
        let raw = self.store.mget(keys).await?;
        if raw.len() != keys.len() {
            return Err(StoreError::CommandFailed {
                command: "MGET".to_string(),
                key: keys.first().map(|k| k.to_string()).unwrap_or_default(),
                reason: format!("expected {} values, got {}", keys.len(), raw.len()),
            }
            .into());
        }
        keys.iter()
            .zip(raw)
            .map(|(key, bytes)| match bytes {
                Some(bytes) => self.codec.decode(key, &bytes).map(Some),
                None => Ok(None),
            })
            .collect()
    }

    /// Encode `value` and store it with `ttl`.
    pub async fn set<T: Serialize + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> CachetResult<()> {
        let bytes = self.codec.encode(key, value)?;
        self.store.set_ex(key, bytes, ttl).await
    }

    /// Write only if `key` is empty. The entry has no expiry until one is
    /// applied separately.
    pub async fn set_nx<T: Serialize + Sync>(&self, key: &CacheKey, value: &T) -> CachetResult<bool> {
        let bytes = self.codec.encode(key, value)?;
        self.store.set_nx(key, bytes).await
    }
}

impl<C: Codec> Clone for PackedStore<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: self.codec.clone(),
        }
    }
}

impl<C: Codec + std::fmt::Debug> std::fmt::Debug for PackedStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedStore")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
