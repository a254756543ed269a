//! Cached Model Loader
//!
//! Uses a persisted `CacheStore` as the whole storage backend for a model
//! type, translating cache absence into a domain "not found" error.

use std::any::type_name;
use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{system_clock, CacheStore, Clock, SnapshotDir};
use crate::config::CacheConfig;
use crate::error::CacheError;

/// A model with a stable identifier.
pub trait Identifiable {
    type Id: Eq + Hash + Clone + Serialize + DeserializeOwned + fmt::Display;

    fn id(&self) -> Self::Id;
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Could not find {model} model with id: {id}")]
    NotFound { model: &'static str, id: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Loads and saves models of type `M` through a named cache snapshot.
pub struct CachedModelLoader<M: Identifiable> {
    cache: CacheStore<M::Id, M>,
    snapshots: SnapshotDir,
    name: String,
}

impl<M> CachedModelLoader<M>
where
    M: Identifiable + Clone + Serialize + DeserializeOwned,
{
    /// Opens the snapshot `name`, starting empty if it does not exist yet.
    pub fn open(
        snapshots: SnapshotDir,
        name: impl Into<String>,
        config: CacheConfig,
    ) -> Result<Self, LoaderError> {
        Self::open_with_clock(snapshots, name, config, system_clock())
    }

    pub fn open_with_clock(
        snapshots: SnapshotDir,
        name: impl Into<String>,
        config: CacheConfig,
        clock: Clock,
    ) -> Result<Self, LoaderError> {
        let name = name.into();
        let loaded =
            CacheStore::load_with_clock(&snapshots, &name, config.clone(), clock.clone());
        let cache = match loaded {
            Ok(cache) => cache,
            Err(err) if err.is_not_found() => {
                warn!(name = %name, "No model snapshot yet, starting empty");
                CacheStore::with_clock(config, clock)
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            cache,
            snapshots,
            name,
        })
    }

    /// Returns the cached model for `id`.
    pub fn load_model(&mut self, id: &M::Id) -> Result<M, LoaderError> {
        self.cache.lookup(id).ok_or_else(|| LoaderError::NotFound {
            model: model_name::<M>(),
            id: id.to_string(),
        })
    }

    /// Caches `model` and persists the snapshot.
    pub fn save_model(&mut self, model: M) -> Result<(), LoaderError> {
        let id = model.id();
        debug!(id = %id, model = model_name::<M>(), "Saving model");
        self.cache.insert(id, model);
        self.cache.save(&self.snapshots, &self.name)?;
        Ok(())
    }

    /// Drops the model for `id` and persists the snapshot.
    pub fn forget_model(&mut self, id: &M::Id) -> Result<Option<M>, LoaderError> {
        let removed = self.cache.remove(id);
        self.cache.save(&self.snapshots, &self.name)?;
        Ok(removed)
    }

    /// Every live cached model.
    pub fn models(&mut self) -> Vec<M> {
        self.cache.all_values()
    }
}

fn model_name<M>() -> &'static str {
    let full = type_name::<M>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Article {
        id: String,
        name: String,
    }

    impl Identifiable for Article {
        type Id = String;

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            name: format!("article {id}"),
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = tempdir().unwrap();
        let snapshots = SnapshotDir::new(dir.path());
        let mut loader: CachedModelLoader<Article> =
            CachedModelLoader::open(snapshots, "articles", CacheConfig::default()).unwrap();

        let err = loader.load_model(&"42".to_string()).unwrap_err();
        assert!(matches!(err, LoaderError::NotFound { .. }));
        assert_eq!(err.to_string(), "Could not find Article model with id: 42");
    }

    #[test]
    fn test_saved_model_survives_reopen() {
        let dir = tempdir().unwrap();
        let snapshots = SnapshotDir::new(dir.path());
        let clock = clock();

        let mut loader: CachedModelLoader<Article> = CachedModelLoader::open_with_clock(
            snapshots.clone(),
            "articles",
            CacheConfig::default(),
            clock.as_clock(),
        )
        .unwrap();
        loader.save_model(article("1")).unwrap();
        assert_eq!(loader.load_model(&"1".to_string()).unwrap(), article("1"));

        let mut reopened: CachedModelLoader<Article> = CachedModelLoader::open_with_clock(
            snapshots,
            "articles",
            CacheConfig::default(),
            clock.as_clock(),
        )
        .unwrap();
        assert_eq!(reopened.load_model(&"1".to_string()).unwrap(), article("1"));
        assert_eq!(reopened.models().len(), 1);
    }

    #[test]
    fn test_expired_model_is_not_found() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let config = CacheConfig::default().with_entry_lifetime(Duration::from_secs(30));

        let mut loader: CachedModelLoader<Article> = CachedModelLoader::open_with_clock(
            SnapshotDir::new(dir.path()),
            "articles",
            config,
            clock.as_clock(),
        )
        .unwrap();
        loader.save_model(article("7")).unwrap();
        clock.advance(Duration::from_secs(30));

        assert!(matches!(
            loader.load_model(&"7".to_string()),
            Err(LoaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_forget_model() {
        let dir = tempdir().unwrap();
        let snapshots = SnapshotDir::new(dir.path());
        let mut loader: CachedModelLoader<Article> =
            CachedModelLoader::open(snapshots, "articles", CacheConfig::default()).unwrap();

        loader.save_model(article("1")).unwrap();
        assert_eq!(loader.forget_model(&"1".to_string()).unwrap(), Some(article("1")));
        assert!(loader.models().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempdir().unwrap();
        let snapshots = SnapshotDir::new(dir.path());
        snapshots.write("articles", b"not a snapshot").unwrap();

        let result: Result<CachedModelLoader<Article>, _> =
            CachedModelLoader::open(snapshots, "articles", CacheConfig::default());
        assert!(matches!(result, Err(LoaderError::Cache(ref e)) if e.is_corrupt()));
    }
}
