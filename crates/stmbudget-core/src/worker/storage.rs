use std::collections::BTreeMap;

use crate::api::Response;

/// Named response caches owned by the worker, keyed by cache name then URL
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: BTreeMap<String, BTreeMap<String, Response>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cache: &str, url: &str, response: Response) {
        self.caches
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    pub fn get(&self, cache: &str, url: &str) -> Option<&Response> {
        self.caches.get(cache).and_then(|c| c.get(url))
    }

    /// First match for `url` across all caches
    pub fn match_url(&self, url: &str) -> Option<&Response> {
        self.caches.values().find_map(|c| c.get(url))
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    pub fn delete(&mut self, cache: &str) -> bool {
        self.caches.remove(cache).is_some()
    }

    pub fn clear(&mut self) {
        self.caches.clear();
    }

    /// Number of stored responses
    pub fn entry_count(&self) -> usize {
        self.caches.values().map(BTreeMap::len).sum()
    }

    /// Total body bytes stored
    pub fn size_bytes(&self) -> usize {
        self.caches
            .values()
            .flat_map(|c| c.values())
            .map(|r| r.body.len())
            .sum()
    }
}
