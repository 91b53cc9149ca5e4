//! Short-lived in-process TTL cache.
//!
//! Values are stored type-erased; `get::<T>` on an entry holding some other
//! type is a miss. Expired entries are invisible to `get` and are dropped by
//! `purge_expired`, which the janitor thread runs on an interval.

use std::any::Any;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::key::CacheKey;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default janitor sweep interval.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Lifetime of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache's default TTL.
    Default,
    After(Duration),
    /// Lives until deleted; for session-scoped flags.
    Never,
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(t) if now >= t)
    }
}

pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        let entry = entries.get(key.as_str())?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn set<T>(&self, key: &CacheKey, value: T, ttl: Ttl)
    where
        T: Send + Sync + 'static,
    {
        let expires_at = match ttl {
            Ttl::Default => Some(Instant::now() + self.default_ttl),
            Ttl::After(d) => Some(Instant::now() + d),
            Ttl::Never => None,
        };
        self.entries.write().insert(
            key.as_str().to_string(),
            Entry {
                value: Arc::new(value),
                expires_at,
            },
        );
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.entries.write().remove(key.as_str()).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Entry count, including expired entries not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a background sweeper. Stops when the returned handle is dropped
    /// or the cache itself is gone.
    pub fn start_janitor(self: &Arc<Self>, interval: Duration) -> std::io::Result<Janitor> {
        let weak: Weak<MemoryCache> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("coinsync-cache-janitor".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(cache) = weak.upgrade() else { break };
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "memory cache sweep");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Janitor {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Handle to the janitor thread.
pub struct Janitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Janitor {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
