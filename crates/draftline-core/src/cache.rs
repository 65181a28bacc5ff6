//! Bounded TTL cache with access-count eviction.
//!
//! Expiry is lazy: entries are purged when a read or a size report
//! touches them, never by a background task. Reads hand back clones so
//! callers can never mutate shared cache state. The explicit
//! [`get_stale`](TtlCache::get_stale) path ignores expiry and exists
//! solely for the aggregator's last-resort quorum fallback.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration for a [`TtlCache`].
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Maximum number of live entries. Inserting beyond this evicts.
    pub capacity: usize,
    /// TTL applied when `set` is called without an explicit one.
    pub default_ttl: Duration,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            default_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    /// Incremented on every read, never decremented. Entries with the
    /// lowest count are evicted first on overflow.
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters reported by [`TtlCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Thread-safe TTL + bounded-size cache. Cloning shares storage.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    config: TtlCacheConfig,
    inner: Arc<Mutex<CacheInner<K, V>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: TtlCacheConfig) -> Self {
        let config = TtlCacheConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            config,
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            })),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TtlCacheConfig::default())
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CacheInner<K, V>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("ttl cache recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Fresh read. An entry past its expiry is purged and reported as
    /// absent, so callers re-fetch or take the explicit stale path.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        match inner.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.entries.remove(key);
                inner.expirations += 1;
                inner.misses += 1;
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                inner.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Fresh read that leaves an expired entry in place instead of
    /// purging it. The aggregator probes with this so an expired merged
    /// result survives long enough for the stale fallback to find it.
    pub fn get_if_fresh(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        match inner.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.misses += 1;
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                inner.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Stale read: returns the stored value even past expiry, without
    /// purging. Last-resort fallback only.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                inner.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a value, evicting first when the cache is full.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut inner = self.lock_inner();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.capacity {
            Self::evict_for_space(&mut inner, self.config.capacity, now);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                access_count: 0,
            },
        );
    }

    /// Overflow handling: sweep already-expired entries first; if the
    /// cache is still full, evict the entry with the lowest access
    /// count, ties broken by oldest creation time.
    fn evict_for_space(inner: &mut CacheInner<K, V>, capacity: usize, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        inner.expirations += (before - inner.entries.len()) as u64;

        while inner.entries.len() >= capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.access_count, entry.created_at))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    inner.entries.remove(&key);
                    inner.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Non-expired presence check. Purges the entry if it has expired.
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match inner.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.entries.remove(key);
                inner.expirations += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.lock_inner();
        inner.entries.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        inner.entries.clear();
    }

    /// Live entry count, reported after sweeping expired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        inner.expirations += (before - inner.entries.len()) as u64;
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        let inner = self.lock_inner();
        CacheStats {
            size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}
