//! Cache tiers: a short-lived in-process map backed by durable JSON files.

pub mod disk;
pub mod key;
pub mod memory;
pub mod tiered;

pub use disk::{DiskCache, DiskCacheError, DiskEntryInfo};
pub use key::{CacheKey, DataKind};
pub use memory::{Janitor, MemoryCache, Ttl, DEFAULT_TTL, SWEEP_INTERVAL};
pub use tiered::{Fetched, Origin, TierTtls, TieredCache};
