//! Shared cache of compiled patterns.
//!
//! One `PatternCache` serves every session in the process. Entries are keyed by
//! the raw pattern string and hold an `Arc<CompiledPattern>`, so a hit is a
//! refcount bump rather than a clone of the token list.
//!
//! ```text
//! lookup(p) ──hit──▶ promote to MRU, hits += 1 ──▶ Some(compiled)
//!          └─miss─▶ misses += 1 ─────────────────▶ None
//!
//! store(p, c) ──full?──▶ pop LRU, evictions += 1 ──▶ insert as MRU
//! ```
//!
//! ## Invariants
//!
//! - The LRU list and all three counters sit behind the same mutex, so an
//!   eviction and its counter update are observed together and no update is
//!   lost under concurrent access.
//! - `entries.len() <= capacity` after every operation. `check_invariants`
//!   reports a violation as an error instead of panicking.
//! - The lock is never held while compiling a pattern.

use super::pattern::CompiledPattern;
use crate::error::{EngineError, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Snapshot of cache accounting, see [`PatternCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub hit_rate: f64,
    /// Evictions since construction or the last [`PatternCache::clear`].
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheInner {
    entries: LruCache<String, Arc<CompiledPattern>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
pub struct PatternCache {
    inner: Mutex<CacheInner>,
    capacity: NonZeroUsize,
}

impl PatternCache {
    /// Create a cache holding at most `capacity` compiled patterns.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| EngineError::invalid("matcher.cache_capacity", "must be greater than zero"))?;
        let inner = CacheInner { entries: LruCache::new(capacity), hits: 0, misses: 0, evictions: 0 };
        Ok(Self { inner: Mutex::new(inner), capacity })
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // Every critical section leaves the list consistent, so poisoning is ignored.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the compiled form of `pattern` if cached, marking it most
    /// recently used.
    pub fn lookup(&self, pattern: &str) -> Option<Arc<CompiledPattern>> {
        let mut inner = self.lock();
        match inner.entries.get(pattern).cloned() {
            Some(compiled) => {
                inner.hits += 1;
                Some(compiled)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite `pattern`, evicting the least recently used entry
    /// when the cache is full.
    pub fn store(&self, pattern: &str, compiled: Arc<CompiledPattern>) {
        let mut inner = self.lock();
        if let Some((evicted, _)) = inner.entries.push(pattern.to_string(), compiled) {
            // `push` also hands back the old value when the key was already
            // present; only a different key is an eviction.
            if evicted != pattern {
                inner.evictions += 1;
                trace!(pattern = %evicted, "evicted compiled pattern");
            }
        }
        debug_assert!(inner.entries.len() <= self.capacity.get());
    }

    /// Look `pattern` up, compiling and storing it on a miss.
    pub fn get_or_compile(&self, pattern: &str) -> Arc<CompiledPattern> {
        if let Some(compiled) = self.lookup(pattern) {
            return compiled;
        }
        let compiled = Arc::new(CompiledPattern::compile(pattern));
        self.store(pattern, Arc::clone(&compiled));
        compiled
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 };
        CacheStats {
            entry_count: inner.entries.len(),
            max_size: self.capacity.get(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
            evictions: inner.evictions,
        }
    }

    /// Drop every entry and reset all counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Whether `pattern` is resident, without touching LRU order or counters.
    pub fn contains(&self, pattern: &str) -> bool {
        self.lock().entries.contains(pattern)
    }

    /// Verify that resident entries never exceed the capacity.
    pub fn check_invariants(&self) -> Result<()> {
        let inner = self.lock();
        let len = inner.entries.len();
        if len > self.capacity.get() || len > inner.entries.cap().get() {
            return Err(EngineError::CacheCapacityInvariantViolation { len, capacity: self.capacity.get() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn compiled(p: &str) -> Arc<CompiledPattern> {
        Arc::new(CompiledPattern::compile(p))
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(PatternCache::new(0), Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn lookup_counts_hits_and_misses() {
        let cache = PatternCache::new(4).unwrap();
        assert_eq!(cache.stats().hit_rate, 0.0);

        assert!(cache.lookup("HELLO *").is_none());
        cache.store("HELLO *", compiled("HELLO *"));
        assert_eq!(cache.lookup("HELLO *").unwrap().source(), "HELLO *");
        assert!(cache.lookup("HELLO *").is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.max_size, 4);
    }

    #[test]
    fn overflow_keeps_capacity_and_evicts_least_recently_used() {
        let cache = PatternCache::new(3).unwrap();
        for p in ["A", "B", "C"] {
            cache.store(p, compiled(p));
        }
        // Touch A so B becomes the least recently used.
        assert!(cache.lookup("A").is_some());
        cache.store("D", compiled("D"));
        cache.store("E", compiled("E"));

        assert_eq!(cache.len(), 3);
        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
        assert!(!cache.contains("C"));
        assert!(cache.contains("D") && cache.contains("E"));
        assert_eq!(cache.stats().evictions, 2);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn many_inserts_never_exceed_capacity() {
        let cache = PatternCache::new(16).unwrap();
        for i in 0..200 {
            let p = format!("PATTERN {i} *");
            cache.store(&p, compiled(&p));
            cache.check_invariants().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 16);
        assert_eq!(stats.evictions, 200 - 16);
        // The survivors are the 16 most recent inserts.
        assert!(cache.contains("PATTERN 199 *"));
        assert!(cache.contains("PATTERN 184 *"));
        assert!(!cache.contains("PATTERN 183 *"));
    }

    #[test]
    fn overwrite_is_not_an_eviction() {
        let cache = PatternCache::new(2).unwrap();
        cache.store("A", compiled("A"));
        cache.store("A", compiled("A"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn clear_resets_entries_and_counters() {
        let cache = PatternCache::new(1).unwrap();
        cache.get_or_compile("A");
        cache.get_or_compile("B");
        cache.get_or_compile("B");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!((stats.hits, stats.misses, stats.evictions), (0, 0, 0));
    }

    #[test]
    fn concurrent_access_loses_no_updates() {
        let cache = Arc::new(PatternCache::new(8).unwrap());
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..250 {
                        let p = format!("P{} *", (t * 7 + i) % 24);
                        cache.get_or_compile(&p);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 8 * 250);
        assert!(stats.entry_count <= 8);
        cache.check_invariants().unwrap();
    }
}
