//! Query Cache Regions
//!
//! Two independently managed regions hold query outcomes:
//! - `SuccessQueryCache`: results that were expensive enough to keep
//! - `ExceptionQueryCache`: normalized failures, so a repeated bad query
//!   short-circuits without reaching the engine
//!
//! ## Design
//!
//! The gatekeeper only sees [`CacheRegion::get`] and [`CacheRegion::put`];
//! capacity and expiry belong to the region. [`MemoryRegion`] uses LRU
//! eviction with a configurable size limit and per-entry TTL. An expired
//! entry reads exactly like one that was never inserted.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CacheConfig, RegionConfig};
use crate::model::{CacheKey, QueryResponse};

pub const SUCCESS_QUERY_CACHE: &str = "SuccessQueryCache";
pub const EXCEPTION_QUERY_CACHE: &str = "ExceptionQueryCache";

/// Cache entry with recency bookkeeping for LRU eviction
#[derive(Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,

    /// When the entry was created
    pub created_at: Instant,

    /// When the entry was last accessed
    pub last_accessed: Instant,

    /// Time-to-live (None = no expiration)
    pub ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        CacheEntry {
            value,
            created_at: now,
            last_accessed: now,
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        if let Some(ttl) = self.ttl {
            self.created_at.elapsed() > ttl
        } else {
            false
        }
    }

    /// Mark the entry as accessed
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Entries currently held
    pub size: usize,
    pub evictions: usize,
    pub expirations: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A named, thread-safe key/value store with its own eviction policy.
pub trait CacheRegion: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &CacheKey) -> Option<QueryResponse>;

    fn put(&self, key: CacheKey, value: QueryResponse);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
    expirations: AtomicUsize,
}

/// In-memory region: LRU on capacity, TTL on age.
pub struct MemoryRegion {
    name: String,
    entries: DashMap<CacheKey, CacheEntry<QueryResponse>>,
    max_entries: usize,
    ttl: Option<Duration>,
    stats: AtomicStats,
}

impl MemoryRegion {
    /// `ttl` of zero means entries never expire.
    pub fn new(name: impl Into<String>, max_entries: usize, ttl: Duration) -> Self {
        MemoryRegion {
            name: name.into(),
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl: (!ttl.is_zero()).then_some(ttl),
            stats: AtomicStats::default(),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &RegionConfig) -> Self {
        Self::new(
            name,
            config.max_entries,
            Duration::from_secs(config.ttl_secs),
        )
    }

    /// Make room for one more entry: drop expired entries first, otherwise
    /// the least recently used one.
    fn evict(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let expired = before.saturating_sub(self.entries.len());
        if expired > 0 {
            self.stats.expirations.fetch_add(expired, Ordering::Relaxed);
            return;
        }

        let lru = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_accessed)
            .map(|entry| entry.key().clone());
        if let Some(key) = lru {
            if self.entries.remove(&key).is_some() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl CacheRegion for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Option<QueryResponse> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.touch();
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Expired: the guard above is released before touching the map again
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: CacheKey, value: QueryResponse) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict();
        }
        self.entries.insert(key, CacheEntry::new(value, self.ttl));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: self.entries.len(),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
        }
    }
}

/// The success and exception regions consulted by the gatekeeper.
#[derive(Clone)]
pub struct QueryCaches {
    pub success: Arc<dyn CacheRegion>,
    pub exception: Arc<dyn CacheRegion>,
}

impl QueryCaches {
    pub fn new(success: Arc<dyn CacheRegion>, exception: Arc<dyn CacheRegion>) -> Self {
        Self { success, exception }
    }

    /// In-memory regions sized from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Arc::new(MemoryRegion::from_config(SUCCESS_QUERY_CACHE, &config.success)),
            Arc::new(MemoryRegion::from_config(
                EXCEPTION_QUERY_CACHE,
                &config.exception,
            )),
        )
    }
}

impl Default for QueryCaches {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryRequest;

    fn key(sql: &str) -> CacheKey {
        QueryRequest::new(sql, "p").cache_key()
    }

    #[test]
    fn test_cache_entry_expiration() {
        let entry: CacheEntry<i32> = CacheEntry::new(42, Some(Duration::from_millis(10)));
        assert!(!entry.is_expired());
        std::thread::sleep(Duration::from_millis(20));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_cache_entry_no_expiration() {
        let entry: CacheEntry<i32> = CacheEntry::new(42, None);
        std::thread::sleep(Duration::from_millis(10));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_touch_refreshes_recency_not_ttl() {
        let mut entry: CacheEntry<i32> = CacheEntry::new(42, Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        entry.touch();
        assert!(entry.last_accessed > entry.created_at);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_region_hit_miss() {
        let region = MemoryRegion::new(SUCCESS_QUERY_CACHE, 100, Duration::from_secs(60));
        assert_eq!(region.name(), SUCCESS_QUERY_CACHE);

        assert!(region.get(&key("select 1")).is_none());
        assert_eq!(region.stats().misses, 1);

        region.put(key("select 1"), QueryResponse::failure("x"));
        assert_eq!(region.get(&key("select 1")).unwrap().message(), "x");
        assert_eq!(region.stats().hits, 1);
        assert_eq!(region.stats().size, 1);
    }

    #[test]
    fn test_region_lru_eviction() {
        let region = MemoryRegion::new("r", 2, Duration::ZERO);

        region.put(key("q1"), QueryResponse::default());
        std::thread::sleep(Duration::from_millis(2));
        region.put(key("q2"), QueryResponse::default());
        std::thread::sleep(Duration::from_millis(2));

        // q1 becomes the most recent
        assert!(region.get(&key("q1")).is_some());

        region.put(key("q3"), QueryResponse::default());

        assert_eq!(region.len(), 2);
        assert!(region.get(&key("q1")).is_some());
        assert!(region.get(&key("q3")).is_some());
        assert!(region.get(&key("q2")).is_none());
        assert_eq!(region.stats().evictions, 1);
    }

    #[test]
    fn test_region_overwrite_does_not_evict() {
        let region = MemoryRegion::new("r", 1, Duration::ZERO);
        region.put(key("q1"), QueryResponse::failure("first"));
        region.put(key("q1"), QueryResponse::failure("second"));
        assert_eq!(region.len(), 1);
        assert_eq!(region.get(&key("q1")).unwrap().message(), "second");
        assert_eq!(region.stats().evictions, 0);
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let region = MemoryRegion::new("r", 10, Duration::from_millis(10));
        region.put(key("q"), QueryResponse::default());
        std::thread::sleep(Duration::from_millis(30));

        assert!(region.get(&key("q")).is_none());
        assert!(region.is_empty());
        let stats = region.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_eviction_prefers_expired_entries() {
        let region = MemoryRegion::new("r", 2, Duration::from_millis(10));
        region.put(key("old1"), QueryResponse::default());
        region.put(key("old2"), QueryResponse::default());
        std::thread::sleep(Duration::from_millis(30));

        region.put(key("new"), QueryResponse::default());
        assert_eq!(region.len(), 1);
        assert_eq!(region.stats().expirations, 2);
        assert_eq!(region.stats().evictions, 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 75,
            misses: 25,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
        assert!(CacheStats::default().hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_caches_from_config_names_regions() {
        let caches = QueryCaches::default();
        assert_eq!(caches.success.name(), SUCCESS_QUERY_CACHE);
        assert_eq!(caches.exception.name(), EXCEPTION_QUERY_CACHE);
        assert!(caches.success.is_empty());
    }
}
