//! Shared Cache
//!
//! Thread-safe handle over a `CacheStore`. The store and its key tracker sit
//! behind a single `RwLock`, so they are always updated together.

use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::cache::persistence::{self, SnapshotDir};
use crate::cache::{system_clock, CacheStats, CacheStore, Clock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Cloneable, lock-guarded cache handle.
///
/// Lookups take the write lock: they refresh LRU order, update statistics and
/// may reap an expired entry.
pub struct SharedCache<K, V> {
    inner: Arc<RwLock<CacheStore<K, V>>>,
    /// Serializes saves so snapshots hit the disk in encode order
    save_lock: Arc<Mutex<()>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            save_lock: Arc::clone(&self.save_lock),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(store: CacheStore<K, V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates an empty cache from configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self::new(CacheStore::new(config))
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.write().await.insert(key, value);
    }

    pub async fn lookup(&self, key: &K) -> Option<V> {
        self.inner.write().await.lookup(key)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().await.remove(key)
    }

    pub async fn remove_all(&self) {
        self.inner.write().await.remove_all();
    }

    pub async fn all_values(&self) -> Vec<V> {
        self.inner.write().await.all_values()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.read().await.stats()
    }

    /// Runs `f` with exclusive access to the underlying store.
    pub async fn with_store<R>(&self, f: impl FnOnce(&mut CacheStore<K, V>) -> R) -> R {
        let mut store = self.inner.write().await;
        f(&mut store)
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Saves a snapshot. Entries are encoded under the store lock; the file
    /// write happens on the blocking pool after that lock is released.
    ///
    /// Saves through clones of one handle are serialized: a later save never
    /// lands on disk before an earlier one.
    pub async fn save(&self, dir: &SnapshotDir, name: &str) -> Result<PathBuf> {
        let _ordered = self.save_lock.lock().await;
        let bytes = {
            let mut store = self.inner.write().await;
            persistence::encode(&mut *store)?
        };

        let target = dir.path_for(name);
        let writer = dir.clone();
        let blob_name = name.to_string();
        let path = tokio::task::spawn_blocking(move || writer.write(&blob_name, &bytes))
            .await
            .map_err(|e| CacheError::io(target, std::io::Error::other(e)))??;
        info!(path = ?path, "Shared cache saved");
        Ok(path)
    }

    /// Loads the snapshot `name` into a new shared cache.
    pub async fn load(dir: &SnapshotDir, name: &str, config: CacheConfig) -> Result<Self> {
        Self::load_with_clock(dir, name, config, system_clock()).await
    }

    pub async fn load_with_clock(
        dir: &SnapshotDir,
        name: &str,
        config: CacheConfig,
        clock: Clock,
    ) -> Result<Self> {
        let reader = dir.clone();
        let blob_name = name.to_string();
        let bytes = tokio::task::spawn_blocking(move || reader.read(&blob_name))
            .await
            .map_err(|e| CacheError::io(dir.path_for(name), std::io::Error::other(e)))??;

        let entries = persistence::decode::<K, V>(&bytes)?;
        Ok(Self::new(CacheStore::from_entries(entries, config, clock, name)))
    }

    /// Loads the snapshot `name`, or starts empty if none exists yet.
    ///
    /// Corrupt snapshots and I/O failures are still reported.
    pub async fn load_or_default(
        dir: &SnapshotDir,
        name: &str,
        config: CacheConfig,
        clock: Clock,
    ) -> Result<Self> {
        match Self::load_with_clock(dir, name, config.clone(), clock.clone()).await {
            Ok(cache) => Ok(cache),
            Err(err) if err.is_not_found() => {
                warn!(name, "No snapshot found, starting with an empty cache");
                Ok(Self::new(CacheStore::with_clock(config, clock)))
            }
            Err(err) => Err(err),
        }
    }
}
