//! Key-value client backing the listing cache, the token cache, the
//! distributed lock, and webhook idempotency markers.
//!
//! ## Architecture
//!
//! - **RedisKv**: shared store for multi-instance deployments
//! - **MemoryKv**: in-process store for single-instance mode and tests
//!
//! Callers decide what a store failure means: the listing cache degrades to
//! the database, while the webhook guard refuses to proceed without its
//! marker. The client itself only reports `StoreUnavailable`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use stockroom_core::{CoreError, Result};

/// Contract for the shared key-value store.
///
/// All values are strings; structured data is serialized by the caller.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    /// Fetch the value at `key`. `Ok(None)` means absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` at `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Store `value` at `key` only if the key does not exist, expiring
    /// after `ttl`. Returns whether this call created the key.
    ///
    /// The write and the existence check are a single atomic operation.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remove `key`. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Shareable key-value client handle.
pub type DynKeyValueClient = Arc<dyn KeyValueClient>;

/// Redis-backed key-value client over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisKv {
    pool: Pool,
}

impl RedisKv {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CoreError::store_unavailable("redis", e.to_string()))
    }
}

#[async_trait]
impl KeyValueClient for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CoreError::store_unavailable("redis", format!("GET {key}: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| CoreError::store_unavailable("redis", format!("SETEX {key}: {e}"))),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| CoreError::store_unavailable("redis", format!("SET {key}: {e}"))),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        // SET with NX and EX in one round trip; Redis replies nil when the
        // key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::store_unavailable("redis", format!("SET NX {key}: {e}")))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| CoreError::store_unavailable("redis", format!("DEL {key}: {e}")))?;
        Ok(removed > 0)
    }
}

/// Stored entry with optional expiration.
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Instant::now())
    }
}

/// In-process key-value client using DashMap.
///
/// Expired entries are dropped lazily on access. Coordination only holds
/// within one process, which is what single-instance mode needs.
#[derive(Clone, Default)]
pub struct MemoryKv {
    map: Arc<DashMap<String, StoredValue>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, counting not-yet-collected expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[async_trait]
impl KeyValueClient for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.map.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // The entry API keeps check-and-insert atomic under concurrent calls.
        match self.map.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.map.remove(key).is_some())
    }
}
