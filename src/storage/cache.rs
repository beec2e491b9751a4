//! LRU read cache for the page store

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Caches decompressed values by key
pub struct SlabCache {
    cache: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SlabCache {
    /// Create a cache holding `capacity` entries (0 falls back to 1000)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(data) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(data.clone())
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: Vec<u8>, data: Vec<u8>) {
        self.cache.lock().put(key, data);
    }

    pub fn remove(&self, key: &[u8]) {
        self.cache.lock().pop(key);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Change capacity, evicting least recently used entries as needed
    pub fn resize(&self, capacity: usize) {
        if let Some(capacity) = NonZeroUsize::new(capacity) {
            self.cache.lock().resize(capacity);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        let cache = self.cache.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: cache.len(),
            capacity: cache.cap().get(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}
