//! Caching Entities
//!
//! Time-bounded key/value caches. Entries carry a last-touch timestamp
//! renewed on every hit and are dropped by a sweep once they have gone
//! untouched for longer than the cache's staleness window.

mod entry;

pub use entry::CacheEntry;

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Default staleness window (10 minutes).
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(600);

/// Default maximum entries per cache.
pub const DEFAULT_MAX_ENTRIES: usize = 65_536;

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    /// Current number of entries.
    pub entries: usize,
    /// Maximum capacity.
    pub max_entries: usize,
    /// Entries past the staleness window but not yet swept.
    pub stale: usize,
}

impl CacheStats {
    /// Fill ratio (entries / max_entries).
    pub fn fill_ratio(&self) -> f64 {
        if self.max_entries == 0 {
            0.0
        } else {
            self.entries as f64 / self.max_entries as f64
        }
    }
}

/// A time-bounded cache swept on last-touch age.
///
/// Lookups do not check staleness; only [`TimedCache::purge_stale`] drops
/// entries, so an entry stays readable until the next sweep.
#[derive(Clone, Debug)]
pub struct TimedCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    max_entries: usize,
    staleness: Duration,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache.
    pub fn new(max_entries: usize, staleness: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries.min(1000)),
            max_entries,
            staleness,
        }
    }

    /// Create a cache with default parameters.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_STALENESS)
    }

    /// Get the staleness window.
    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Insert or replace a value, resetting its timestamps.
    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.update(value, now);
            return;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_one(now);
        }

        self.entries.insert(key, CacheEntry::new(value, now));
    }

    /// Look up a value and renew its last-touch time.
    pub fn get_and_touch(&mut self, key: &K, now: Instant) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(entry.value().clone())
    }

    /// Look up a value without touching it.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(CacheEntry::value)
    }

    /// Get the full cache entry.
    pub fn get_entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Check if a key is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value().clone())
    }

    /// Number of entries (including stale ones not yet swept).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry untouched for longer than the staleness window.
    ///
    /// Returns the number of entries dropped.
    pub fn purge_stale(&mut self, now: Instant) -> usize {
        let staleness = self.staleness;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now, staleness));
        before - self.entries.len()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Evict one entry (stale first, then least recently touched).
    fn evict_one(&mut self, now: Instant) {
        let staleness = self.staleness;
        let stale_key = self
            .entries
            .iter()
            .find(|(_, e)| e.is_stale(now, staleness))
            .map(|(k, _)| k.clone());

        if let Some(key) = stale_key {
            self.entries.remove(&key);
            return;
        }

        let lru_key = self
            .entries
            .iter()
            .max_by_key(|(_, e)| e.idle_time(now))
            .map(|(k, _)| k.clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
        }
    }

    /// Get cache statistics.
    pub fn stats(&self, now: Instant) -> CacheStats {
        let stale = self
            .entries
            .values()
            .filter(|e| e.is_stale(now, self.staleness))
            .count();

        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            stale,
        }
    }
}

impl<K, V> Default for TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(600);

    #[test]
    fn test_cache_stats_fill_ratio() {
        let stats = CacheStats {
            entries: 50,
            max_entries: 100,
            stale: 0,
        };
        assert!((stats.fill_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_insert_and_get() {
        let now = Instant::now();
        let mut cache = TimedCache::new(10, WINDOW);

        cache.insert("10.0.0.1", 1u32, now);
        assert_eq!(cache.get_and_touch(&"10.0.0.1", now), Some(1));
        assert_eq!(cache.peek(&"10.0.0.1"), Some(&1));
        assert_eq!(cache.get_and_touch(&"10.0.0.2", now), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_touch_renews_freshness() {
        let start = Instant::now();
        let mut cache = TimedCache::new(10, WINDOW);
        cache.insert("a", 1u32, start);
        cache.insert("b", 2u32, start);

        // Touch "a" just before the window closes
        cache.get_and_touch(&"a", start + Duration::from_secs(500));

        let purged = cache.purge_stale(start + Duration::from_secs(700));
        assert_eq!(purged, 1);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_stale_entries_readable_until_swept() {
        let start = Instant::now();
        let mut cache = TimedCache::new(10, WINDOW);
        cache.insert("a", 1u32, start);

        let later = start + Duration::from_secs(900);
        assert_eq!(cache.stats(later).stale, 1);
        assert_eq!(cache.peek(&"a"), Some(&1));

        assert_eq!(cache.purge_stale(later), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_replaces_value_and_age() {
        let start = Instant::now();
        let mut cache = TimedCache::new(10, WINDOW);
        cache.insert("a", 1u32, start);

        let later = start + Duration::from_secs(30);
        cache.insert("a", 2u32, later);

        let entry = cache.get_entry(&"a").unwrap();
        assert_eq!(*entry.value(), 2);
        assert_eq!(entry.age(later), Duration::ZERO);
    }

    #[test]
    fn test_eviction_prefers_least_recently_touched() {
        let start = Instant::now();
        let mut cache = TimedCache::new(2, WINDOW);
        cache.insert("a", 1u32, start);
        cache.insert("b", 2u32, start + Duration::from_secs(1));
        cache.get_and_touch(&"a", start + Duration::from_secs(2));

        cache.insert("c", 3u32, start + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_remove_and_clear() {
        let now = Instant::now();
        let mut cache = TimedCache::new(10, WINDOW);
        cache.insert(1u8, "x", now);
        cache.insert(2u8, "y", now);

        assert_eq!(cache.remove(&1), Some("x"));
        assert_eq!(cache.remove(&1), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
