//! Key-value store backends.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use memory::{MemoryStore, StoreOpCounts};
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use traits::KeyValueStore;
