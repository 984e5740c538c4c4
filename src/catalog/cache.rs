//! Bounded least-recently-used cache and the metadata cache built on it.

use crate::catalog::{BottleDetail, CatalogId, CatalogTable};
use crate::trace::trace_warn;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Bounded map that evicts the least recently used key when full.
///
/// Recency is tracked with a monotonically increasing tick per access; the
/// `order` index maps ticks back to keys so the oldest key is the first entry.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Clone + Eq + Hash, V> LruCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let (_, last) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(last, tick);
        if let Some(k) = self.order.remove(&previous) {
            self.order.insert(tick, k);
        }
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Inserts or replaces `key`, returning the evicted entry if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some((old_value, last)) = self.entries.get_mut(&key) {
            *old_value = value;
            let previous = std::mem::replace(last, tick);
            self.order.remove(&previous);
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
        evicted
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.order.values().cloned().collect()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Counters describing cache effectiveness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Metadata lookup with a bounded LRU cache in front of the catalog table.
///
/// The table is immutable and shared; the cache is the only mutable state and
/// every get-or-insert-and-evict sequence runs under one mutex, so concurrent
/// identify calls cannot interleave inside an update.
pub struct MetadataCache {
    table: Arc<CatalogTable>,
    entries: Mutex<LruCache<CatalogId, Arc<BottleDetail>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MetadataCache {
    /// Creates a cache over `table` holding at most `capacity` details.
    pub fn new(table: Arc<CatalogTable>, capacity: usize) -> Self {
        Self {
            table,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns details for `id`, loading them from the table on a miss.
    ///
    /// Ids absent from the table log a warning and return `None`; they are not
    /// cached, so a table entry is never shadowed by a stale miss.
    pub fn get_details(&self, id: &CatalogId) -> Option<Arc<BottleDetail>> {
        // Entries are independent values, so a poisoned lock is still consistent.
        let mut cache = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(detail) = cache.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(detail));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let Some(detail) = self.table.lookup(id) else {
            trace_warn!("details not found in catalog", id = id);
            return None;
        };
        let detail = Arc::new(detail);
        if cache.insert(id.clone(), Arc::clone(&detail)).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Some(detail)
    }

    /// Returns hit, miss and eviction counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of cached details.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when no detail is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached details.
    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }

    /// Ids currently cached, least recently used first.
    pub fn cached_ids(&self) -> Vec<CatalogId> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys_by_recency()
    }

    /// Returns the underlying table.
    pub fn table(&self) -> &CatalogTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::LruCache;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        assert!(cache.insert("a", 1).is_none());
        assert!(cache.insert("b", 2).is_none());
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.insert("c", 3), Some(("b", 2)));
        assert_eq!(cache.keys_by_recency(), vec!["a", "c"]);
    }

    #[test]
    fn reinsert_replaces_without_growth() {
        let mut cache = LruCache::new(2);
        cache.insert(1, "one");
        cache.insert(1, "uno");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&1), Some(&"uno"));
    }

    #[test]
    fn peek_does_not_touch_recency() {
        let mut cache = LruCache::new(2);
        cache.insert(1, ());
        cache.insert(2, ());
        cache.peek(&1);
        assert_eq!(cache.insert(3, ()), Some((1, ())));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, 1);
        assert_eq!(cache.insert(2, 2), Some((1, 1)));
        assert_eq!(cache.len(), 1);
    }
}
