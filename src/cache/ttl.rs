//! Bounded key/value store with per-entry expiry.
//!
//! Expiry is enforced at read time: [`TtlCache::get`] compares the entry's
//! absolute deadline against the tokio clock and drops the entry if it has
//! passed, so an expired value is never handed out. Separately, moka
//! reclaims expired entries in the background using each entry's own TTL
//! (see [`PerEntryTtl`]) and evicts least-recently-used entries once
//! `max_entries` is reached, which keeps memory bounded under heavy key
//! diversity.

use std::hash::Hash;
use std::time::Duration;

use moka::Expiry;
use moka::future::Cache;
use serde::Deserialize;
use tokio::time::Instant;

/// Configuration for the response cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// let config = CacheConfig::new().max_entries(5_000);
/// assert_eq!(config.max_entries, 5_000);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

fn default_max_entries() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }
}

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// A stored value and its absolute deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_TTL);
        let now = Instant::now();
        // Unrepresentable deadline: the entry is stored but never served.
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        Self {
            value,
            expires_at,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// moka expiry policy reading the TTL stored on each entry.
struct PerEntryTtl;

impl<K, V> Expiry<K, CacheEntry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &CacheEntry<V>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &CacheEntry<V>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe TTL cache shared by all in-flight requests.
pub struct TtlCache<K, V> {
    entries: Cache<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }

    /// Look up a live value.
    ///
    /// Returns `None` on a miss or if the entry's deadline has passed; an
    /// expired entry is removed on the way out.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key).await?;
        if entry.is_expired(Instant::now()) {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    /// Insert or overwrite `key`, live for `ttl` from now (at most [`MAX_TTL`]).
    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl)).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
