//! BPE result caches.
//!
//! Both implementations map a pre-token string to its token IDs and are
//! safe for concurrent use, so several encode calls can share one
//! tokenizer. The unbounded cache is a plain map behind a read-write lock;
//! the bounded one wraps an LRU list behind a mutex because every `get`
//! mutates recency order.

use lru::LruCache;
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};

/// Cache eviction policy, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep every entry. Memory grows with the number of distinct
    /// pre-tokens; fine for typical text, where the distinct set is small.
    Unbounded,
    /// Keep at most this many entries, evicting least-recently-used.
    Lru(usize),
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Unbounded
    }
}

pub(crate) trait BpeCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u32>>;
    fn put(&self, key: &str, ids: Vec<u32>);
    fn len(&self) -> usize;
}

/// Grow-only concurrent map.
pub(crate) struct UnboundedCache {
    map: RwLock<FxHashMap<String, Vec<u32>>>,
}

impl UnboundedCache {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(FxHashMap::default()),
        }
    }
}

impl BpeCache for UnboundedCache {
    fn get(&self, key: &str) -> Option<Vec<u32>> {
        self.map.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, ids: Vec<u32>) {
        if let Ok(mut map) = self.map.write() {
            map.entry(key.to_string()).or_insert(ids);
        }
    }

    fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }
}

/// Bounded cache with least-recently-used eviction.
pub(crate) struct BoundedCache {
    inner: Mutex<LruCache<String, Vec<u32>>>,
}

impl BoundedCache {
    /// `capacity` must be non-zero; the caller validates.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl BpeCache for BoundedCache {
    fn get(&self, key: &str) -> Option<Vec<u32>> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, ids: Vec<u32>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(key.to_string(), ids);
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }
}
