//! Cache Module
//!
//! Bounded in-memory caching with lazy TTL expiration, LRU eviction and
//! snapshot persistence.

mod clock;
mod entry;
mod key_tracker;
mod lru;
pub mod persistence;
mod stats;
mod store;


// Re-export public types
pub use clock::{system_clock, Clock, ManualClock};
pub use entry::Entry;
pub use key_tracker::{EvictionListener, KeyTracker};
pub use lru::LruTracker;
pub use persistence::SnapshotDir;
pub use stats::CacheStats;
pub use store::CacheStore;
