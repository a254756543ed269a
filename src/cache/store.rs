//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, lazy TTL
//! expiration and a key tracker kept in step with every removal path.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::debug;

use crate::cache::clock::{add_duration, system_clock, Clock};
use crate::cache::{CacheStats, Entry, EvictionListener, KeyTracker, LruTracker};
use crate::config::CacheConfig;

/// How a read reaches an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Caller lookup: counts toward hit/miss and refreshes recency.
    Lookup,
    /// Enumeration or snapshot: reaps expired entries, leaves recency alone.
    Scan,
}

// == Cache Store ==
/// Bounded key/value store whose entries expire a fixed lifetime after insertion.
///
/// Expiration is enforced lazily: an expired entry stays resident until a
/// lookup, enumeration or save touches it, at which point it is reaped. When an
/// insert pushes the store past `maximum_entry_count`, least recently used
/// entries are evicted until it is back at the bound.
///
/// The store and its `KeyTracker` are updated together without internal
/// locking. Share a store across threads through `SharedCache`, which guards
/// both behind one lock.
pub struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, Entry<K, V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Resident key mirror, notified on every removal
    tracker: KeyTracker<K>,
    /// Caller-supplied hooks, notified right after the tracker
    listeners: Vec<Box<dyn EvictionListener<K> + Send + Sync>>,
    stats: CacheStats,
    config: CacheConfig,
    clock: Clock,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates a store reading the real wall clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a store reading "now" from `clock`.
    pub fn with_clock(mut config: CacheConfig, clock: Clock) -> Self {
        config.maximum_entry_count = config.maximum_entry_count.max(1);
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            tracker: KeyTracker::new(),
            listeners: Vec::new(),
            stats: CacheStats::new(),
            config,
            clock,
        }
    }

    /// Attaches `listener`, called synchronously with each key the store drops.
    pub fn with_eviction_listener(
        mut self,
        listener: impl EvictionListener<K> + Send + Sync + 'static,
    ) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    // == Insert ==
    /// Stores `value` under `key`, valid for the configured entry lifetime.
    ///
    /// Any existing entry for `key` is replaced wholesale, including its
    /// expiration. May evict least recently used entries to stay within bound.
    pub fn insert(&mut self, key: K, value: V) {
        let expiration_date = add_duration(self.now(), self.config.entry_lifetime);
        self.put(Entry::new(key, value, expiration_date));
    }

    // == Set ==
    /// Inserts on `Some`, removes on `None`.
    pub fn set(&mut self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => {
                self.remove(&key);
            }
        }
    }

    // == Restore ==
    /// Reinserts a previously persisted entry, keeping its original expiration.
    ///
    /// Entries already expired under the current clock are dropped and the
    /// method returns false.
    pub fn restore(&mut self, entry: Entry<K, V>) -> bool {
        if entry.is_expired(self.now()) {
            return false;
        }
        self.put(entry);
        true
    }

    // == Remove ==
    /// Removes the entry for `key`, returning its value if one was resident.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.discard(key).map(|entry| entry.value)
    }

    // == Remove All ==
    /// Removes every resident entry.
    pub fn remove_all(&mut self) {
        let keys: Vec<K> = self.tracker.keys().cloned().collect();
        for key in &keys {
            self.discard(key);
        }
        debug!(removed = keys.len(), "Removed all cache entries");
    }

    // == Keys ==
    /// Keys currently resident, possibly including expired ones not yet reaped.
    pub fn keys(&self) -> Vec<K> {
        self.tracker.keys().cloned().collect()
    }

    /// Returns true if `key` has a live entry, reaping it if it has expired.
    pub fn contains_key(&mut self, key: &K) -> bool {
        self.live_entry(key, Access::Scan).is_some()
    }

    // == Length ==
    /// Number of resident entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn tracker(&self) -> &KeyTracker<K> {
        &self.tracker
    }

    /// Current instant according to the injected clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        (self.clock)()
    }

    /// Reads an entry without reaping, counting or touching it.
    #[cfg(test)]
    pub(crate) fn peek(&self, key: &K) -> Option<&Entry<K, V>> {
        self.entries.get(key)
    }

    // == Internals ==
    fn put(&mut self, entry: Entry<K, V>) {
        let key = entry.key.clone();
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);
        self.tracker.on_inserted(key);
        self.enforce_capacity();
        self.stats.set_total_entries(self.entries.len());
    }

    fn enforce_capacity(&mut self) {
        while self.entries.len() > self.config.maximum_entry_count {
            let Some(oldest) = self.lru.evict_oldest() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.notify_evicted(&oldest);
                self.stats.record_eviction();
                debug!(
                    resident = self.entries.len(),
                    limit = self.config.maximum_entry_count,
                    "Evicted least recently used entry"
                );
            }
        }
    }

    fn notify_evicted(&mut self, key: &K) {
        self.tracker.on_evicted(key);
        for listener in &mut self.listeners {
            listener.on_evicted(key);
        }
    }

    /// Single removal path shared by explicit removal and expiry reaping.
    fn discard(&mut self, key: &K) -> Option<Entry<K, V>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.notify_evicted(key);
        self.stats.set_total_entries(self.entries.len());
        Some(entry)
    }

    /// Returns the entry for `key` if it is live, reaping it if it has expired.
    fn live_entry(&mut self, key: &K, access: Access) -> Option<&Entry<K, V>> {
        let now = self.now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                if access == Access::Lookup {
                    self.stats.record_miss();
                }
                return None;
            }
        };

        if expired {
            self.discard(key);
            self.stats.record_expiration();
            if access == Access::Lookup {
                self.stats.record_miss();
            }
            debug!(resident = self.entries.len(), "Reaped expired entry");
            return None;
        }

        if access == Access::Lookup {
            self.stats.record_hit();
            self.lru.touch(key);
        }
        self.entries.get(key)
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Lookup ==
    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is removed as a side effect and reported as absent.
    pub fn lookup(&mut self, key: &K) -> Option<V> {
        self.live_entry(key, Access::Lookup)
            .map(|entry| entry.value.clone())
    }

    /// Like `lookup`, but returns the whole entry including its expiration.
    pub fn entry(&mut self, key: &K) -> Option<Entry<K, V>> {
        self.live_entry(key, Access::Lookup).cloned()
    }

    // == All Values ==
    /// Values of every live entry. Expired entries met along the way are reaped.
    pub fn all_values(&mut self) -> Vec<V> {
        self.live_entries()
            .into_iter()
            .map(|entry| entry.value)
            .collect()
    }

    /// Every live entry, least recently used first.
    ///
    /// Walks the tracked key set so expired entries are reaped, then orders the
    /// survivors by recency so reinserting them in order reproduces it.
    pub fn live_entries(&mut self) -> Vec<Entry<K, V>> {
        let candidates = self.keys();
        for key in &candidates {
            self.live_entry(key, Access::Scan);
        }

        self.lru
            .iter_oldest_first()
            .filter_map(|key| self.entries.get(key).cloned())
            .collect()
    }
}

impl<K, V> Default for CacheStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries)
            .field("lru", &self.lru)
            .field("tracker", &self.tracker)
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
