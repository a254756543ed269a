//! Configuration Module
//!
//! Cache sizing, entry lifetime and snapshot location, loadable from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default entry lifetime: 12 hours.
pub const DEFAULT_ENTRY_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

/// Default maximum number of resident entries.
pub const DEFAULT_MAXIMUM_ENTRY_COUNT: usize = 50;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an entry stays valid after insertion
    pub entry_lifetime: Duration,
    /// Maximum number of entries the cache can hold
    pub maximum_entry_count: usize,
    /// Directory holding named snapshots
    pub snapshot_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENTRY_LIFETIME_SECS` - Entry lifetime in seconds (default: 43200)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 50)
    /// - `CACHE_DIR` - Snapshot directory (default: `<temp>/expiring-cache`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            entry_lifetime: env::var("CACHE_ENTRY_LIFETIME_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.entry_lifetime),
            maximum_entry_count: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|n| n.max(1))
                .unwrap_or(defaults.maximum_entry_count),
            snapshot_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
        }
    }

    pub fn with_entry_lifetime(mut self, lifetime: Duration) -> Self {
        self.entry_lifetime = lifetime;
        self
    }

    /// Sets the capacity bound. Zero is clamped to one.
    pub fn with_maximum_entry_count(mut self, count: usize) -> Self {
        self.maximum_entry_count = count.max(1);
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_lifetime: DEFAULT_ENTRY_LIFETIME,
            maximum_entry_count: DEFAULT_MAXIMUM_ENTRY_COUNT,
            snapshot_dir: env::temp_dir().join("expiring-cache"),
        }
    }
}
