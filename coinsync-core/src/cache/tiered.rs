//! Two-level read-through over the memory and disk tiers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::disk::DiskCache;
use super::key::CacheKey;
use super::memory::{MemoryCache, Ttl};

/// Lifetimes for one kind of data in each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTtls {
    pub memory: Duration,
    pub disk: Duration,
}

impl TierTtls {
    /// Market snapshots: 10 seconds in memory, a day on disk.
    pub const MARKET: TierTtls = TierTtls {
        memory: Duration::from_secs(10),
        disk: Duration::from_secs(24 * 60 * 60),
    };
}

/// Where a read-through value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    Live,
    /// Live fetch failed or came back empty; served the durable snapshot.
    Disk,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Origin::Memory => "memory",
            Origin::Live => "live",
            Origin::Disk => "disk",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
}

/// Memory tier in front of the disk tier.
#[derive(Clone)]
pub struct TieredCache {
    memory: Arc<MemoryCache>,
    disk: DiskCache,
}

impl TieredCache {
    pub fn new(memory: Arc<MemoryCache>, disk: DiskCache) -> Self {
        Self { memory, disk }
    }

    pub fn memory(&self) -> &Arc<MemoryCache> {
        &self.memory
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Non-empty value from memory, if any.
    pub fn peek<T>(&self, key: &CacheKey, is_empty: impl Fn(&T) -> bool) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.memory.get::<T>(key).filter(|v| !is_empty(v))
    }

    /// Non-empty value from disk, if any. Corrupt and expired entries are
    /// misses; the disk tier logs and quarantines the former.
    pub fn recover<T>(&self, key: &CacheKey, is_empty: impl Fn(&T) -> bool) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.disk.get::<T>(key) {
            Ok(value) if !is_empty(&value) => Some(value),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "disk cache miss");
                None
            }
        }
    }

    /// Set both tiers. The disk write happens off-thread.
    pub fn store<T>(&self, key: &CacheKey, value: &T, ttls: TierTtls)
    where
        T: Clone + Serialize + Send + Sync + 'static,
    {
        self.memory.set(key, value.clone(), Ttl::After(ttls.memory));
        self.disk.set_async(key.clone(), value.clone(), ttls.disk);
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.memory.delete(key);
    }

    /// Memory, then live, then disk.
    ///
    /// A successful non-empty live value refreshes both tiers. If the live
    /// fetch fails, or returns something empty, the disk snapshot is served
    /// instead. When disk has nothing either, the live error (or the empty
    /// live value) is returned as-is.
    pub fn read_through<T, E, F>(
        &self,
        key: &CacheKey,
        ttls: TierTtls,
        is_empty: impl Fn(&T) -> bool,
        fetch: F,
    ) -> Result<Fetched<T>, E>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.peek(key, &is_empty) {
            tracing::debug!(key = %key, "memory cache hit");
            return Ok(Fetched {
                value,
                origin: Origin::Memory,
            });
        }

        let live = fetch();
        match &live {
            Ok(value) if !is_empty(value) => {
                self.store(key, value, ttls);
            }
            Ok(_) => tracing::debug!(key = %key, "live fetch returned empty data"),
            Err(e) => tracing::warn!(key = %key, error = %e, "live fetch failed, trying disk"),
        }

        match live {
            Ok(value) if !is_empty(&value) => Ok(Fetched {
                value,
                origin: Origin::Live,
            }),
            other => match self.recover(key, &is_empty) {
                Some(value) => Ok(Fetched {
                    value,
                    origin: Origin::Disk,
                }),
                None => other.map(|value| Fetched {
                    value,
                    origin: Origin::Live,
                }),
            },
        }
    }
}
