//! Fuzz test for cache entry and counter decoding
//!
//! Feeds arbitrary bytes to the codec and the counter parser, as a store
//! shared with other writers might hand back anything. Decoding must fail
//! cleanly rather than panic, and anything that decodes must survive a
//! re-encode.
//!
//! Run with: cargo +nightly fuzz run entry_fuzz -- -max_total_time=60

#![no_main]

use cachet_core::{CacheEntry, CacheKey};
use cachet_storage::{parse_counter, Codec, JsonCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = CacheKey::entity("fuzz", 1);
    let codec = JsonCodec;

    if let Ok(entry) = codec.decode::<CacheEntry<serde_json::Value>>(&key, data) {
        let bytes = codec
            .encode(&key, &entry)
            .expect("decoded entry should re-encode");
        let again: CacheEntry<serde_json::Value> = codec
            .decode(&key, &bytes)
            .expect("re-encoded entry should decode");
        assert_eq!(again.id(), entry.id());
        assert_eq!(again.cached_at(), entry.cached_at());
    }

    if let Ok(value) = parse_counter(&key, data) {
        let text = value.to_string();
        assert_eq!(parse_counter(&key, text.as_bytes()).ok(), Some(value));
    }
});
