// Two-layer response cache: bounded in-memory map with insertion-order
// eviction, mirrored to an optional durable store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::{CacheEntry, DurableStore};
use crate::api::Payload;

/// Default bound on in-memory entries
pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Default)]
struct MemoryLayer {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
}

impl MemoryLayer {
    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

pub struct CacheStore {
    memory: Mutex<MemoryLayer>,
    durable: Option<Box<dyn DurableStore>>,
    max_entries: usize,
    counters: Counters,
}

impl CacheStore {
    /// Memory-only cache holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            memory: Mutex::new(MemoryLayer::default()),
            durable: None,
            max_entries: max_entries.max(1),
            counters: Counters::default(),
        }
    }

    pub fn with_durable(mut self, store: impl DurableStore + 'static) -> Self {
        self.durable = Some(Box::new(store));
        self
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    pub fn get(&self, key: &str) -> Option<Payload> {
        self.entry(key).map(|entry| entry.value)
    }

    /// Look up a valid entry, memory first, then the durable layer.
    ///
    /// Expired entries are dropped from memory and never promoted from disk.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        {
            let mut memory = self.lock();
            if let Some(entry) = memory.entries.get(key) {
                if entry.is_valid_at(now) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                debug!(key, "Memory cache entry expired");
                memory.remove(key);
            }
        }

        if let Some(ref durable) = self.durable {
            match durable.load(key) {
                Ok(Some(entry)) if entry.is_valid_at(now) => {
                    debug!(key, "Promoting durable cache entry");
                    self.insert_memory(entry.clone());
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry);
                }
                Ok(Some(_)) => debug!(key, "Durable cache entry expired"),
                Ok(None) => {}
                Err(e) => debug!(key, error = %e, "Durable cache read failed"),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: &str, value: Payload, ttl: Duration) {
        self.put(CacheEntry::new(key, value, ttl));
    }

    /// Store a prepared entry in memory and mirror it to the durable layer
    pub fn put(&self, entry: CacheEntry) {
        if let Some(ref durable) = self.durable {
            if let Err(e) = durable.save(&entry) {
                warn!(key = %entry.key, error = %e, "Failed to write durable cache entry");
            }
        }
        self.insert_memory(entry);
    }

    fn insert_memory(&self, entry: CacheEntry) {
        let mut memory = self.lock();
        if let Some(existing) = memory.entries.get_mut(&entry.key) {
            // Refresh in place; insertion position is unchanged
            *existing = entry;
            return;
        }

        while memory.entries.len() >= self.max_entries {
            let Some(oldest) = memory.order.pop_front() else {
                break;
            };
            memory.entries.remove(&oldest);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %oldest, "Evicted oldest cache entry");
        }

        memory.order.push_back(entry.key.clone());
        memory.entries.insert(entry.key.clone(), entry);
    }

    /// Remove every entry whose key contains `pattern`.
    /// Returns the number of in-memory entries removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let removed = {
            let mut memory = self.lock();
            let doomed: Vec<String> = memory
                .entries
                .keys()
                .filter(|key| key.contains(pattern))
                .cloned()
                .collect();
            for key in &doomed {
                memory.remove(key);
            }
            doomed.len()
        };

        if let Some(ref durable) = self.durable {
            if let Err(e) = durable.remove_matching(pattern) {
                debug!(pattern, error = %e, "Durable cache invalidation failed");
            }
        }

        debug!(pattern, removed, "Cache invalidated");
        removed
    }

    pub fn clear(&self) {
        {
            let mut memory = self.lock();
            memory.entries.clear();
            memory.order.clear();
        }
        if let Some(ref durable) = self.durable {
            if let Err(e) = durable.clear() {
                warn!(error = %e, "Failed to clear durable cache");
            }
        }
    }

    /// Number of entries in the memory layer
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLayer> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, DiskStore};
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn text(s: &str) -> Payload {
        Payload::Text(s.to_string())
    }

    /// Durable layer that fails every operation, like disabled storage
    struct BrokenStore;

    impl DurableStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("storage disabled".into()))
        }
        fn save(&self, _entry: &CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("storage disabled".into()))
        }
        fn remove_matching(&self, _pattern: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("storage disabled".into()))
        }
        fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("storage disabled".into()))
        }
    }

    #[test]
    fn test_get_within_ttl() {
        let cache = CacheStore::new(10);
        cache.set("k", text("v"), HOUR);
        assert_eq!(cache.get("k"), Some(text("v")));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache = CacheStore::new(10);
        cache.set("k", text("v"), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let mut old = CacheEntry::new("old", text("v"), HOUR);
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        cache.put(old);
        assert_eq!(cache.get("old"), None);
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let cache = CacheStore::new(3);
        for i in 0..5 {
            cache.set(&format!("k{}", i), text("v"), HOUR);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k1"), None);
        for i in 2..5 {
            assert!(cache.get(&format!("k{}", i)).is_some());
        }
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_eviction_ignores_access_order() {
        let cache = CacheStore::new(2);
        cache.set("a", text("1"), HOUR);
        cache.set("b", text("2"), HOUR);
        // Reading "a" does not protect it
        assert!(cache.get("a").is_some());
        cache.set("c", text("3"), HOUR);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_refresh_in_place_keeps_position() {
        let cache = CacheStore::new(2);
        cache.set("a", text("1"), HOUR);
        cache.set("b", text("2"), HOUR);
        cache.set("a", text("1b"), HOUR);
        assert_eq!(cache.get("a"), Some(text("1b")));
        cache.set("c", text("3"), HOUR);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_invalidate_by_substring() {
        let cache = CacheStore::new(10);
        cache.set("GET /api/budgets/", text("1"), HOUR);
        cache.set("GET /api/budgets/4/", text("2"), HOUR);
        cache.set("GET /api/forecasts/", text("3"), HOUR);
        assert_eq!(cache.invalidate("/api/budgets/"), 2);
        assert!(cache.get("GET /api/forecasts/").is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_durable_hit_is_promoted() {
        let dir = tempdir().expect("tempdir");
        let first = CacheStore::new(10).with_durable(DiskStore::new(dir.path().to_path_buf()).unwrap());
        first.set("GET /dashboard", text("<main/>"), HOUR);

        let second = CacheStore::new(10).with_durable(DiskStore::new(dir.path().to_path_buf()).unwrap());
        assert!(second.is_empty());
        assert_eq!(second.get("GET /dashboard"), Some(text("<main/>")));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_expired_durable_entry_not_promoted() {
        let dir = tempdir().expect("tempdir");
        let disk = DiskStore::new(dir.path().to_path_buf()).unwrap();
        let mut old = CacheEntry::new("GET /dashboard", text("<main/>"), HOUR);
        old.created_at = Utc::now() - chrono::Duration::hours(3);
        disk.save(&old).unwrap();

        let cache = CacheStore::new(10).with_durable(disk);
        assert_eq!(cache.get("GET /dashboard"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_broken_durable_layer_degrades_to_memory() {
        let cache = CacheStore::new(10).with_durable(BrokenStore);
        cache.set("k", text("v"), HOUR);
        assert_eq!(cache.get("k"), Some(text("v")));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.invalidate("k"), 1);
        cache.clear();
    }
}
