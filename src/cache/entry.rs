//! Cache entry with last-touch tracking.

use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its timestamps.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    value: V,
    /// When the current value was stored.
    created_at: Instant,
    /// When the entry was last stored or read.
    last_touched: Instant,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry.
    pub fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_touched: now,
        }
    }

    /// Get the cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Get the time the current value was stored.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the last touch time.
    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }

    /// Renew the last-touch time.
    pub fn touch(&mut self, now: Instant) {
        self.last_touched = now;
    }

    /// Replace the value and reset both timestamps.
    pub fn update(&mut self, value: V, now: Instant) {
        self.value = value;
        self.created_at = now;
        self.last_touched = now;
    }

    /// Time since the current value was stored.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Time since last touch.
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touched)
    }

    /// Check if the entry has gone untouched for longer than `staleness`.
    pub fn is_stale(&self, now: Instant, staleness: Duration) -> bool {
        self.idle_time(now) > staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_entry_staleness() {
        let start = Instant::now();
        let entry = CacheEntry::new(7u32, start);
        let window = Duration::from_millis(500);

        assert!(!entry.is_stale(start, window));
        assert!(!entry.is_stale(start + window, window));
        assert!(entry.is_stale(start + window + Duration::from_millis(1), window));
    }

    #[test]
    fn test_cache_entry_touch() {
        let start = Instant::now();
        let mut entry = CacheEntry::new("a", start);

        entry.touch(start + Duration::from_secs(3));
        assert_eq!(entry.idle_time(start + Duration::from_secs(4)), Duration::from_secs(1));
        // Touching does not change the value's age
        assert_eq!(entry.age(start + Duration::from_secs(4)), Duration::from_secs(4));
    }

    #[test]
    fn test_cache_entry_update() {
        let start = Instant::now();
        let mut entry = CacheEntry::new("a", start);

        let later = start + Duration::from_secs(10);
        entry.update("b", later);
        assert_eq!(*entry.value(), "b");
        assert_eq!(entry.created_at(), later);
        assert_eq!(entry.last_touched(), later);
    }

    #[test]
    fn test_cache_entry_saturates_backwards_time() {
        let start = Instant::now();
        let entry = CacheEntry::new((), start + Duration::from_secs(5));
        assert_eq!(entry.idle_time(start), Duration::ZERO);
    }
}
