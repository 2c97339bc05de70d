//! Distributed lock over the key-value store.
//!
//! Acquisition is a single atomic set-if-absent with a TTL, release deletes
//! the key. The TTL bounds how long a crashed holder can block everyone
//! else. Acquisition never blocks; callers that need to wait poll
//! [`DistributedLock::try_acquire`] themselves.

use std::time::Duration;

use stockroom_core::Result;

use crate::kv::DynKeyValueClient;

pub struct DistributedLock {
    kv: DynKeyValueClient,
    key: String,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(kv: DynKeyValueClient, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            kv,
            key: key.into(),
            ttl,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempts to take the lock. Returns `Ok(true)` only for the call that
    /// created the key; everyone else sees `Ok(false)` until it is released
    /// or its TTL lapses.
    pub async fn try_acquire(&self) -> Result<bool> {
        self.kv.set_nx(&self.key, "1", self.ttl).await
    }

    /// Releases the lock. Releasing a lock that already expired is fine.
    pub async fn release(&self) -> Result<()> {
        let existed = self.kv.delete(&self.key).await?;
        if !existed {
            tracing::debug!(key = %self.key, "Lock was already gone at release");
        }
        Ok(())
    }
}
