//! Key Tracker Module
//!
//! Mirrors the set of resident keys so the store can be enumerated and
//! snapshotted.

use std::collections::HashSet;
use std::hash::Hash;

// == Eviction Listener ==
/// Receives a synchronous notification whenever the store drops a key,
/// whether by explicit removal, capacity eviction or expiry reap.
///
/// The store always notifies its own `KeyTracker`; further listeners are
/// attached with `CacheStore::with_eviction_listener`. Closures taking `&K`
/// are listeners too.
pub trait EvictionListener<K> {
    fn on_evicted(&mut self, key: &K);
}

impl<K, F> EvictionListener<K> for F
where
    F: FnMut(&K),
{
    fn on_evicted(&mut self, key: &K) {
        self(key)
    }
}

// == Key Tracker ==
/// The set of keys with a resident entry in the store.
///
/// Expired entries that have not been reaped yet are still resident, so
/// `keys()` may briefly name keys whose lookup will return nothing.
#[derive(Debug)]
pub struct KeyTracker<K> {
    keys: HashSet<K>,
}

impl<K: Eq + Hash> KeyTracker<K> {
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
        }
    }

    /// Registers a newly inserted key.
    pub fn on_inserted(&mut self, key: K) {
        self.keys.insert(key);
    }

    /// Current resident key identities.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Eq + Hash> EvictionListener<K> for KeyTracker<K> {
    fn on_evicted(&mut self, key: &K) {
        self.keys.remove(key);
    }
}

impl<K: Eq + Hash> Default for KeyTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
