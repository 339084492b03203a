//! Value codecs.
//!
//! The cache layer treats encoding as opaque: anything that turns a
//! `Serialize` value into bytes and back can sit behind [`Codec`].

use cachet_core::{CacheKey, CachetResult, CodecError};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes cached values to bytes and back.
///
/// `key` is only used to make error messages point at the offending entry.
pub trait Codec: Send + Sync + Clone + 'static {
    fn encode<T: Serialize>(&self, key: &CacheKey, value: &T) -> CachetResult<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, key: &CacheKey, bytes: &[u8]) -> CachetResult<T>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, key: &CacheKey, value: &T) -> CachetResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            CodecError::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &CacheKey, bytes: &[u8]) -> CachetResult<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            CodecError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
