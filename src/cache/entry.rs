//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with an absolute
//! expiration time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A value, the key it was stored under, and the instant it stops being valid.
///
/// Entries are never mutated. Replacing a key builds a new `Entry` with a
/// freshly computed expiration date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    /// The key this entry is stored under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Absolute expiration instant
    pub expiration_date: DateTime<Utc>,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    pub fn new(key: K, value: V, expiration_date: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            expiration_date,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expiration_date`,
    /// so a lifetime of L is valid over `[t0, t0 + L)`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_date
    }

    // == Time To Live ==
    /// Remaining lifetime at `now`, zero once expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        if self.is_expired(now) {
            chrono::Duration::zero()
        } else {
            self.expiration_date - now
        }
    }
}
