//! Thread-safe LRU cache bounded by entry count and approximate memory.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Size limits for an [`LruCache`].
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction starts.
    pub max_entries: usize,
    /// Maximum approximate memory usage in bytes before eviction starts.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_bytes: 200 * 1024 * 1024, // 200MB
        }
    }
}

/// Cache statistics for monitoring and diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Current number of entries.
    pub entries: usize,
    /// Current approximate memory usage in bytes.
    pub bytes: usize,
    /// Total number of cache hits.
    pub hits: u64,
    /// Total number of cache misses.
    pub misses: u64,
    /// Total number of evictions.
    pub evictions: u64,
    /// Hit rate (hits / (hits + misses)); zero before any lookup.
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    last_used: u64,
    size: usize,
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    tick: u64,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU cache with configurable entry and memory limits.
///
/// `get` promotes the key to most-recently-used; `put` replaces any
/// existing value, sets MRU, and evicts least-recently-used entries until
/// both bounds hold. The per-value size is supplied by a weigher function
/// at construction, since only the caller knows what a symbol tree weighs.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    config: CacheConfig,
    weigher: Box<dyn Fn(&V) -> usize + Send + Sync>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache with the given bounds and value weigher.
    pub fn new(config: CacheConfig, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
                bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            config,
            weigher: Box::new(weigher),
        }
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.map.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value, then evict until both bounds hold.
    pub fn put(&self, key: K, value: V) {
        let size = (self.weigher)(&value);
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(old) = inner.map.insert(key, Entry { value, last_used: tick, size }) {
            inner.bytes -= old.size;
        }
        inner.bytes += size;

        self.evict_if_necessary(&mut inner);
    }

    /// Remove a key. Returns true when it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(key) {
            Some(entry) => {
                inner.bytes -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Check for a key without touching recency or statistics.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.bytes = 0;
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current approximate memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Snapshot of counters and sizes.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            entries: inner.map.len(),
            bytes: inner.bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
        }
    }

    /// Export all entries, e.g. for persistence. Does not touch recency.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let inner = self.inner.lock();
        inner.map.iter().map(|(k, e)| (k.clone(), e.value.clone())).collect()
    }

    /// Replace the contents with the given entries (clears first).
    pub fn load<I: IntoIterator<Item = (K, V)>>(&self, entries: I) {
        self.clear();
        for (k, v) in entries {
            self.put(k, v);
        }
    }

    fn evict_if_necessary(&self, inner: &mut Inner<K, V>) {
        let mut evicted = 0usize;
        while !inner.map.is_empty()
            && (inner.map.len() > self.config.max_entries || inner.bytes > self.config.max_bytes)
        {
            // Oldest last_used wins eviction. The scan is linear but only
            // runs when a bound is exceeded, and caches here hold at most a
            // few thousand entries.
            let eldest = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            let Some(key) = eldest else { break };
            if let Some(entry) = inner.map.remove(&key) {
                inner.bytes -= entry.size;
                inner.evictions += 1;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(
                evicted,
                entries = inner.map.len(),
                bytes = inner.bytes,
                "lru evicted entries"
            );
        }
    }
}
