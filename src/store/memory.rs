//! In-process window store.
//!
//! Counters live in a sharded concurrent map. Each operation holds the
//! shard lock for its key, so operations are atomic per key just like the
//! networked store. Expiry is evaluated lazily on access and by
//! [`MemoryStore::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{StoreError, WindowSnapshot, WindowStore};

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Instant,
}

impl Slot {
    fn new(count: u64, now: Instant, ttl_secs: u64) -> Result<Self, StoreError> {
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs))
            .ok_or_else(|| {
                StoreError::Command(format!("ttl of {} seconds is out of range", ttl_secs))
            })?;
        Ok(Self { count, expires_at })
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime rounded up to whole seconds.
    fn ttl_secs(&self, now: Instant) -> u64 {
        let remaining = self.expires_at.saturating_duration_since(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// A window store backed by a concurrent in-memory map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired counter and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.slots.len())
    }

    /// Number of counters currently held, expired or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Periodically purge expired counters until the returned task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged = purged, remaining = store.len(), "Purged expired counters");
                }
            }
        })
    }

    fn evict_if_expired(&self, key: &str, now: Instant) {
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.evict_if_expired(key, Instant::now());
        Ok(self.slots.get(key).map(|slot| slot.count))
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl_secs: u64) -> Result<(), StoreError> {
        trace!(key = %key, value = value, ttl_secs = ttl_secs, "Setting counter");
        let slot = Slot::new(value, Instant::now(), ttl_secs)?;
        self.slots.insert(key.to_string(), slot);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.evict_if_expired(key, Instant::now());
        Ok(self.slots.get_mut(key).map(|mut slot| {
            slot.count += 1;
            slot.count
        }))
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        self.evict_if_expired(key, now);
        Ok(self.slots.get(key).map(|slot| slot.ttl_secs(now)))
    }

    fn supports_atomic_increment(&self) -> bool {
        true
    }

    async fn increment_or_create(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let now = Instant::now();
        let fresh = Slot::new(0, now, ttl_secs)?;
        let mut slot = self.slots.entry(key.to_string()).or_insert(fresh);

        if slot.is_expired(now) {
            *slot = fresh;
        }
        slot.count += 1;

        Ok(WindowSnapshot {
            count: slot.count,
            ttl_secs: Some(slot.ttl_secs(now)),
        })
    }
}
