//! Durable JSON cache, the fallback of last resort.
//!
//! Layout: `{cache_dir}/fcache.{key}.json`, one envelope per key.
//!
//! - Atomic writes (write to a unique .tmp, rename into place)
//! - Fire-and-forget writes on the rayon pool; a write that finishes after a
//!   newer write for the same key is discarded
//! - Expiry stored in the envelope; expired entries read as a miss
//! - Quarantine for undecodable files (`.quarantined`)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::key::CacheKey;

const FILE_PREFIX: &str = "fcache.";

#[derive(Debug, Error)]
pub enum DiskCacheError {
    #[error("no cached entry for '{key}'")]
    NotFound { key: String },

    #[error("cached entry for '{key}' expired at {expired_at}")]
    Expired {
        key: String,
        expired_at: DateTime<Utc>,
    },

    #[error("corrupt cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cache I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    key: String,
    stored_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    data_hash: String,
    value: T,
}

/// Summary of one on-disk entry.
#[derive(Debug, Clone, Serialize)]
pub struct DiskEntryInfo {
    pub key: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

/// Tracks in-flight async writes so callers can wait for them.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

#[derive(Clone)]
pub struct DiskCache {
    cache_dir: PathBuf,
    seq: Arc<AtomicU64>,
    committed: Arc<Mutex<HashMap<String, u64>>>,
    pending: Arc<Pending>,
}

impl DiskCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            seq: Arc::new(AtomicU64::new(0)),
            committed: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Pending::default()),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{FILE_PREFIX}{key}.json"))
    }

    /// Read and decode the entry for `key`.
    ///
    /// A file that can't be decoded is renamed to `.quarantined` so it stops
    /// shadowing future writes, and reported as `Corrupt`.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, DiskCacheError> {
        let path = self.entry_path(key.as_str());
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DiskCacheError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(DiskCacheError::Io(format!("read {}: {e}", path.display()))),
        };

        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(env) => env,
            Err(e) => {
                self.quarantine(&path, &e.to_string());
                return Err(DiskCacheError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if envelope.key != key.as_str() {
            let reason = format!("envelope holds key '{}'", envelope.key);
            self.quarantine(&path, &reason);
            return Err(DiskCacheError::Corrupt {
                key: key.to_string(),
                reason,
            });
        }

        if Utc::now() >= envelope.expires_at {
            return Err(DiskCacheError::Expired {
                key: key.to_string(),
                expired_at: envelope.expires_at,
            });
        }

        Ok(envelope.value)
    }

    /// Write `value` under `key`, blocking until it's on disk.
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> Result<(), DiskCacheError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.write_entry(key, value, ttl, seq)
    }

    /// Queue a write on the rayon pool and return immediately.
    ///
    /// Failures are logged; nobody waits on the result.
    pub fn set_async<T>(&self, key: CacheKey, value: T, ttl: Duration)
    where
        T: Serialize + Send + 'static,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        *self.pending.count.lock() += 1;

        let cache = self.clone();
        rayon::spawn(move || {
            if let Err(e) = cache.write_entry(&key, &value, ttl, seq) {
                tracing::warn!(key = %key, error = %e, "async disk cache write failed");
            }
            let mut count = cache.pending.count.lock();
            *count -= 1;
            if *count == 0 {
                cache.pending.idle.notify_all();
            }
        });
    }

    /// Wait for queued async writes. Returns false if `timeout` elapsed first.
    pub fn flush(&self, timeout: Duration) -> bool {
        let mut count = self.pending.count.lock();
        if *count == 0 {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    fn write_entry<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        seq: u64,
    ) -> Result<(), DiskCacheError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DiskCacheError::Io(format!("failed to create dir: {e}")))?;

        let value_json = serde_json::to_vec(value)
            .map_err(|e| DiskCacheError::Io(format!("value serialization: {e}")))?;
        let stored_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let envelope = Envelope {
            key: key.to_string(),
            stored_at,
            expires_at: stored_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            data_hash: blake3::hash(&value_json).to_hex().to_string(),
            value,
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| DiskCacheError::Io(format!("envelope serialization: {e}")))?;

        let path = self.entry_path(key.as_str());
        let tmp_path = path.with_extension(format!("json.{seq}.tmp"));
        fs::write(&tmp_path, json)
            .map_err(|e| DiskCacheError::Io(format!("write {}: {e}", tmp_path.display())))?;

        // Only the newest write for a key gets to land.
        let mut committed = self.committed.lock();
        if committed.get(key.as_str()).is_some_and(|&last| last > seq) {
            let _ = fs::remove_file(&tmp_path);
            return Ok(());
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DiskCacheError::Io(format!("atomic rename failed: {e}"))
        })?;
        committed.insert(key.to_string(), seq);
        Ok(())
    }

    fn quarantine(&self, path: &Path, reason: &str) {
        let target = path.with_extension("json.quarantined");
        tracing::warn!(
            path = %path.display(),
            reason,
            "quarantining corrupt cache file"
        );
        let _ = fs::rename(path, target);
    }

    /// Describe every readable entry. Undecodable files are skipped.
    pub fn status(&self) -> Result<Vec<DiskEntryInfo>, DiskCacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DiskCacheError::Io(format!("read dir: {e}"))),
        };

        let now = Utc::now();
        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DiskCacheError::Io(format!("dir entry: {e}")))?;
            let path = entry.path();
            let is_entry = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"));
            if !is_entry {
                continue;
            }

            let Ok(bytes) = fs::read(&path) else { continue };
            let Ok(env) = serde_json::from_slice::<Envelope<IgnoredAny>>(&bytes) else {
                continue;
            };
            infos.push(DiskEntryInfo {
                key: env.key,
                size_bytes: bytes.len() as u64,
                stored_at: env.stored_at,
                expires_at: env.expires_at,
                expired: now >= env.expires_at,
            });
        }

        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    /// Remove every cache file (entries, temp files, quarantined files).
    ///
    /// Returns the removed paths.
    pub fn clean(&self) -> Result<Vec<PathBuf>, DiskCacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DiskCacheError::Io(format!("read dir: {e}"))),
        };

        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DiskCacheError::Io(format!("dir entry: {e}")))?;
            let path = entry.path();
            let ours = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX));
            if ours && path.is_file() {
                fs::remove_file(&path)
                    .map_err(|e| DiskCacheError::Io(format!("remove {}: {e}", path.display())))?;
                removed.push(path);
            }
        }
        self.committed.lock().clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn set_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::coins("usd");

        let mut value = BTreeMap::new();
        value.insert("Bitcoin".to_string(), 64_000.0_f64);
        cache.set(&key, &value, HOUR).unwrap();

        let loaded: BTreeMap<String, f64> = cache.get(&key).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let err = cache.get::<u32>(&CacheKey::coins("usd")).unwrap_err();
        assert!(matches!(err, DiskCacheError::NotFound { .. }));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::global_summary("usd");
        cache.set(&key, &1u32, Duration::ZERO).unwrap();

        let err = cache.get::<u32>(&key).unwrap_err();
        assert!(matches!(err, DiskCacheError::Expired { .. }));
    }

    #[test]
    fn corrupt_entry_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::coins("usd");
        let path = dir.path().join("fcache.coins_by_name_usd.json");
        fs::write(&path, "not json {{{").unwrap();

        let err = cache.get::<u32>(&key).unwrap_err();
        assert!(matches!(err, DiskCacheError::Corrupt { .. }));
        assert!(!path.exists());
        assert!(dir.path().join("fcache.coins_by_name_usd.json.quarantined").exists());

        // Next write lands normally.
        cache.set(&key, &7u32, HOUR).unwrap();
        assert_eq!(cache.get::<u32>(&key).unwrap(), 7);
    }

    #[test]
    fn wrong_value_type_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::coins("usd");
        cache.set(&key, &"text", HOUR).unwrap();
        assert!(matches!(
            cache.get::<u32>(&key).unwrap_err(),
            DiskCacheError::Corrupt { .. }
        ));
    }

    #[test]
    fn async_write_lands_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::coins("eur");

        cache.set_async(key.clone(), vec![1u32, 2], HOUR);
        assert!(cache.flush(Duration::from_secs(5)));
        assert_eq!(cache.get::<Vec<u32>>(&key).unwrap(), vec![1, 2]);
    }

    #[test]
    fn newest_async_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = CacheKey::coins("usd");

        for i in 0..20u32 {
            cache.set_async(key.clone(), i, HOUR);
        }
        assert!(cache.flush(Duration::from_secs(5)));
        assert_eq!(cache.get::<u32>(&key).unwrap(), 19);
    }

    #[test]
    fn status_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.set(&CacheKey::coins("usd"), &1u32, HOUR).unwrap();
        cache.set(&CacheKey::global_summary("usd"), &2u32, Duration::ZERO).unwrap();
        fs::write(dir.path().join("unrelated.txt"), "keep me").unwrap();

        let status = cache.status().unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].key, "coins_by_name_usd");
        assert!(!status[0].expired);
        assert!(status[1].expired);

        let removed = cache.clean().unwrap();
        assert_eq!(removed.len(), 2);
        assert!(cache.status().unwrap().is_empty());
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn status_of_missing_dir_is_empty() {
        let cache = DiskCache::new("/nonexistent/coinsync/cache");
        assert!(cache.status().unwrap().is_empty());
        assert!(cache.clean().unwrap().is_empty());
    }
}
