//! Snapshot Persistence Module
//!
//! Serializes the live entries of a `CacheStore` into a versioned JSON
//! document and writes it as a named blob under a snapshot directory.
//!
//! Writes go to a temporary sibling file that is fsynced and then renamed over
//! the target, so a crash mid-save leaves the previous snapshot intact.

use std::fs::{self, File};
use std::hash::Hash;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::clock::{system_clock, Clock};
use crate::cache::{CacheStore, Entry};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Version tag written into every snapshot.
pub const FORMAT_VERSION: u32 = 1;

/// File extension of a named snapshot.
pub const SNAPSHOT_EXTENSION: &str = "cache";

// Distinguishes temporary files of concurrent writes within this process
static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize)]
struct SnapshotOut<'a, K, V> {
    format_version: u32,
    entries: &'a [Entry<K, V>],
}

#[derive(Deserialize)]
struct SnapshotHeader {
    format_version: u32,
}

#[derive(Deserialize)]
struct SnapshotIn<K, V> {
    entries: Vec<Entry<K, V>>,
}

// == Encode ==
/// Encodes the live entries of `store`. Expired entries are reaped and left out.
pub fn encode<K, V>(store: &mut CacheStore<K, V>) -> Result<Vec<u8>>
where
    K: Eq + Hash + Clone + Serialize,
    V: Clone + Serialize,
{
    encode_entries(&store.live_entries())
}

/// Encodes an already collected list of entries.
pub fn encode_entries<K, V>(entries: &[Entry<K, V>]) -> Result<Vec<u8>>
where
    K: Serialize,
    V: Serialize,
{
    serde_json::to_vec(&SnapshotOut {
        format_version: FORMAT_VERSION,
        entries,
    })
    .map_err(CacheError::Encode)
}

// == Decode ==
/// Decodes a snapshot back into entries with their original expiration dates.
pub fn decode<K, V>(bytes: &[u8]) -> Result<Vec<Entry<K, V>>>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let header: SnapshotHeader = serde_json::from_slice(bytes).map_err(CacheError::Decode)?;
    if header.format_version != FORMAT_VERSION {
        return Err(CacheError::UnsupportedFormat {
            found: header.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let snapshot: SnapshotIn<K, V> = serde_json::from_slice(bytes).map_err(CacheError::Decode)?;
    Ok(snapshot.entries)
}

// == Snapshot Directory ==
/// A directory of named snapshots, one `<name>.cache` file per name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.snapshot_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot stored under `name`.
    ///
    /// The name is not checked here; `write`, `read` and `remove` reject
    /// names that would leave the directory.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{SNAPSHOT_EXTENSION}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.path_for(name).is_file()
    }

    /// Atomically replaces the snapshot `name` with `bytes`.
    ///
    /// Each call writes through its own temporary file, so concurrent writers
    /// never rename each other's data. Callers that need the last write to
    /// win must order their writes, as `SharedCache::save` does.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_name(name)?;
        fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        let path = self.path_for(name);
        let seq = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!(
            "{name}.{SNAPSHOT_EXTENSION}.{}.{seq}.tmp",
            process::id()
        ));

        if let Err(err) = write_synced(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&tmp, err));
        }
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&path, err));
        }

        debug!(path = ?path, bytes = bytes.len(), "Snapshot written");
        Ok(path)
    }

    /// Reads the snapshot `name`.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        let path = self.path_for(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(CacheError::SnapshotNotFound { path })
            }
            Err(err) => Err(CacheError::io(path, err)),
        }
    }

    /// Deletes the snapshot `name`. Returns false if there was none.
    pub fn remove(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::io(path, err)),
        }
    }
}

/// A name must be a single, non-empty path component.
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if invalid {
        return Err(CacheError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// == Store Save / Load ==
impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Writes the live entries to the snapshot `name` under `dir`.
    ///
    /// Apart from reaping expired entries, in-memory state is not changed,
    /// even when the write fails.
    pub fn save(&mut self, dir: &SnapshotDir, name: &str) -> Result<PathBuf> {
        let entries = self.live_entries();
        let bytes = encode_entries(&entries)?;
        let path = dir.write(name, &bytes)?;
        info!(path = ?path, entries = entries.len(), "Cache saved");
        Ok(path)
    }

    /// Loads the snapshot `name` into a fresh store reading the wall clock.
    pub fn load(dir: &SnapshotDir, name: &str, config: CacheConfig) -> Result<Self> {
        Self::load_with_clock(dir, name, config, system_clock())
    }

    /// Loads the snapshot `name` into a fresh store reading `clock`.
    ///
    /// The blob is fully decoded before the store is built, so a corrupt
    /// snapshot never yields a partially filled cache.
    pub fn load_with_clock(
        dir: &SnapshotDir,
        name: &str,
        config: CacheConfig,
        clock: Clock,
    ) -> Result<Self> {
        let bytes = dir.read(name)?;
        let entries = decode::<K, V>(&bytes)?;
        Ok(Self::from_entries(entries, config, clock, name))
    }

    pub(crate) fn from_entries(
        entries: Vec<Entry<K, V>>,
        config: CacheConfig,
        clock: Clock,
        name: &str,
    ) -> Self {
        let mut store = Self::with_clock(config, clock);
        let total = entries.len();
        let mut restored = 0usize;
        for entry in entries {
            if store.restore(entry) {
                restored += 1;
            }
        }

        info!(
            name,
            restored,
            skipped_expired = total - restored,
            "Cache loaded"
        );
        store
    }
}
