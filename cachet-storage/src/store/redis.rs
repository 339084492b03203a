//! Redis-backed store.
//!
//! Every command is sent through a `ConnectionManager`, which reconnects on
//! its own; a failed command surfaces as a [`StoreError`] and is never
//! retried here.

use std::time::Duration;

use async_trait::async_trait;
use cachet_core::{CacheKey, CachetResult, StoreError};
use redis::aio::ConnectionManager;
use redis::RedisError;

use super::traits::KeyValueStore;

/// [`KeyValueStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> CachetResult<Self> {
        let client = redis::Client::open(url).map_err(|e| map_error("CONNECT", url, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_error("CONNECT", url, e))?;
        tracing::info!(url, "Connected to redis cache store");
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn map_error(command: &str, key: &str, e: RedisError) -> cachet_core::CachetError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
        .into()
    } else {
        StoreError::CommandFailed {
            command: command.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX rejects zero.
    (ttl.as_millis() as u64).max(1)
}

fn key_args(keys: &[CacheKey]) -> Vec<&str> {
    keys.iter().map(CacheKey::as_str).collect()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> CachetResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("GET", key.as_str(), e))?;
        Ok(value)
    }

    async fn mget(&self, keys: &[CacheKey]) -> CachetResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(key_args(keys))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("MGET", keys[0].as_str(), e))?;
        Ok(values)
    }

    async fn set_ex(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CachetResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("SET", key.as_str(), e))?;
        Ok(())
    }

    async fn set_nx(&self, key: &CacheKey, value: Vec<u8>) -> CachetResult<bool> {
        let mut conn = self.conn.clone();
        let written: bool = redis::cmd("SETNX")
            .arg(key.as_str())
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("SETNX", key.as_str(), e))?;
        Ok(written)
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> CachetResult<bool> {
        let mut conn = self.conn.clone();
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key.as_str())
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PEXPIRE", key.as_str(), e))?;
        Ok(applied)
    }

    async fn delete(&self, keys: &[CacheKey]) -> CachetResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key_args(keys))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("DEL", keys[0].as_str(), e))?;
        Ok(removed)
    }

    async fn incr_by(&self, key: &CacheKey, amount: i64) -> CachetResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCRBY")
            .arg(key.as_str())
            .arg(amount)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("INCRBY", key.as_str(), e))?;
        Ok(value)
    }

    async fn sadd(&self, key: &CacheKey, member: &str) -> CachetResult<bool> {
        let mut conn = self.conn.clone();
        let added: bool = redis::cmd("SADD")
            .arg(key.as_str())
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("SADD", key.as_str(), e))?;
        Ok(added)
    }

    async fn smembers(&self, key: &CacheKey) -> CachetResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("SMEMBERS", key.as_str(), e))?;
        Ok(members)
    }
}
