//! In-process key-value store.
//!
//! Implements the complete [`KeyValueStore`] contract (expiry, sets, integer
//! increments) on a `HashMap` guarded by a `RwLock`. Expiry is lazy: expired
//! entries are dropped when next touched, and evaluated against an injected
//! [`Clock`] so tests can move time.
//!
//! Also records per-command counters and can simulate an outage, which makes
//! it the backend of choice for tests of the cache components.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use cachet_core::{
    system_clock, CacheKey, CachetResult, SharedClock, StoreError, Timestamp,
};
use chrono::Duration as ChronoDuration;

use super::traits::KeyValueStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at: Option<Timestamp>,
}

impl Slot {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Number of commands served, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOpCounts {
    pub get: u64,
    pub mget: u64,
    pub set_ex: u64,
    pub set_nx: u64,
    pub expire: u64,
    pub delete: u64,
    pub incr_by: u64,
    pub sadd: u64,
    pub smembers: u64,
}

impl StoreOpCounts {
    /// Commands that can modify the store.
    pub fn writes(&self) -> u64 {
        self.set_ex + self.set_nx + self.expire + self.delete + self.incr_by + self.sadd
    }
}

#[derive(Debug, Default)]
struct OpCounters {
    get: AtomicU64,
    mget: AtomicU64,
    mget_keys_max: AtomicU64,
    set_ex: AtomicU64,
    set_nx: AtomicU64,
    expire: AtomicU64,
    delete: AtomicU64,
    incr_by: AtomicU64,
    sadd: AtomicU64,
    smembers: AtomicU64,
}

/// In-memory [`KeyValueStore`].
///
/// Cloning is cheap and clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Slot>>>,
    clock: SharedClock,
    counters: Arc<OpCounters>,
    unavailable: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a store that evaluates expiry against `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            clock,
            counters: Arc::new(OpCounters::default()),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent command fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the command counters.
    pub fn op_counts(&self) -> StoreOpCounts {
        let c = &self.counters;
        StoreOpCounts {
            get: c.get.load(Ordering::Relaxed),
            mget: c.mget.load(Ordering::Relaxed),
            set_ex: c.set_ex.load(Ordering::Relaxed),
            set_nx: c.set_nx.load(Ordering::Relaxed),
            expire: c.expire.load(Ordering::Relaxed),
            delete: c.delete.load(Ordering::Relaxed),
            incr_by: c.incr_by.load(Ordering::Relaxed),
            sadd: c.sadd.load(Ordering::Relaxed),
            smembers: c.smembers.load(Ordering::Relaxed),
        }
    }

    /// Largest number of keys requested by a single `mget`.
    pub fn largest_mget(&self) -> u64 {
        self.counters.mget_keys_max.load(Ordering::Relaxed)
    }

    /// Whether `key` currently holds a live value.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now();
        self.data
            .read()
            .map(|data| data.get(key.as_str()).is_some_and(|slot| slot.is_live(now)))
            .unwrap_or(false)
    }

    /// Remaining time to live of `key`: `None` if absent, `Some(None)` if the
    /// key never expires.
    pub fn ttl(&self, key: &CacheKey) -> Option<Option<Duration>> {
        let now = self.clock.now();
        let data = self.data.read().ok()?;
        let slot = data.get(key.as_str()).filter(|slot| slot.is_live(now))?;
        Some(
            slot.expires_at
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO)),
        )
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.data
            .read()
            .map(|data| data.values().filter(|slot| slot.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> CachetResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "memory store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn write(&self) -> CachetResult<RwLockWriteGuard<'_, HashMap<String, Slot>>> {
        self.data.write().map_err(|_| StoreError::LockPoisoned.into())
    }

    fn expiry(&self, ttl: Duration) -> Option<Timestamp> {
        let ttl = ChronoDuration::from_std(ttl).ok()?;
        self.clock.now().checked_add_signed(ttl)
    }

    /// Remove `key` if it has expired, then return the live slot if any.
    fn live_slot<'a>(
        data: &'a mut HashMap<String, Slot>,
        key: &str,
        now: Timestamp,
    ) -> Option<&'a mut Slot> {
        if data.get(key).is_some_and(|slot| !slot.is_live(now)) {
            data.remove(key);
        }
        data.get_mut(key)
    }

    fn read_bytes(
        data: &mut HashMap<String, Slot>,
        key: &CacheKey,
        now: Timestamp,
    ) -> CachetResult<Option<Vec<u8>>> {
        match Self::live_slot(data, key.as_str(), now) {
            None => Ok(None),
            Some(Slot {
                value: StoredValue::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "string".to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> CachetResult<Option<Vec<u8>>> {
        self.check_available()?;
        self.counters.get.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        Self::read_bytes(&mut data, key, now)
    }

    async fn mget(&self, keys: &[CacheKey]) -> CachetResult<Vec<Option<Vec<u8>>>> {
        self.check_available()?;
        self.counters.mget.fetch_add(1, Ordering::Relaxed);
        self.counters
            .mget_keys_max
            .fetch_max(keys.len() as u64, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        // Like Redis MGET, keys holding a non-string value read as absent.
        Ok(keys
            .iter()
            .map(|key| Self::read_bytes(&mut data, key, now).ok().flatten())
            .collect())
    }

    async fn set_ex(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CachetResult<()> {
        self.check_available()?;
        self.counters.set_ex.fetch_add(1, Ordering::Relaxed);
        let expires_at = self.expiry(ttl);
        let mut data = self.write()?;
        data.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &CacheKey, value: Vec<u8>) -> CachetResult<bool> {
        self.check_available()?;
        self.counters.set_nx.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        if Self::live_slot(&mut data, key.as_str(), now).is_some() {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Bytes(value),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CachetResult<bool> {
        self.check_available()?;
        self.counters.expire.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut data = self.write()?;
        match Self::live_slot(&mut data, key.as_str(), now) {
            Some(slot) => {
                slot.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, keys: &[CacheKey]) -> CachetResult<u64> {
        self.check_available()?;
        self.counters.delete.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = data.remove(key.as_str()) {
                if slot.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn incr_by(&self, key: &CacheKey, amount: i64) -> CachetResult<i64> {
        self.check_available()?;
        self.counters.incr_by.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        let not_an_integer = || StoreError::NotAnInteger {
            key: key.to_string(),
        };

        let (current, expires_at) = match Self::live_slot(&mut data, key.as_str(), now) {
            None => (0, None),
            Some(Slot {
                value: StoredValue::Bytes(bytes),
                expires_at,
            }) => {
                let current = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(not_an_integer)?;
                (current, *expires_at)
            }
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                    expected: "string".to_string(),
                }
                .into())
            }
        };

        let next = current.checked_add(amount).ok_or_else(not_an_integer)?;
        data.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Bytes(next.to_string().into_bytes()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn sadd(&self, key: &CacheKey, member: &str) -> CachetResult<bool> {
        self.check_available()?;
        self.counters.sadd.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        match Self::live_slot(&mut data, key.as_str(), now) {
            None => {
                let mut members = BTreeSet::new();
                members.insert(member.to_string());
                data.insert(
                    key.to_string(),
                    Slot {
                        value: StoredValue::Set(members),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
            Some(Slot {
                value: StoredValue::Set(members),
                ..
            }) => Ok(members.insert(member.to_string())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "set".to_string(),
            }
            .into()),
        }
    }

    async fn smembers(&self, key: &CacheKey) -> CachetResult<Vec<String>> {
        self.check_available()?;
        self.counters.smembers.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut data = self.write()?;
        match Self::live_slot(&mut data, key.as_str(), now) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: StoredValue::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "set".to_string(),
            }
            .into()),
        }
    }
}
