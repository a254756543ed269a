//! Expiring Cache - A bounded, time-expiring key/value cache
//!
//! Provides lazy TTL expiration, LRU eviction and crash-safe snapshot
//! persistence, plus a model loader and a request retry queue built on top.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod retry;
pub mod shared;

pub use cache::{CacheStats, CacheStore, Entry, SnapshotDir};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use loader::{CachedModelLoader, Identifiable, LoaderError};
pub use retry::{OutboundRequest, PendingRequest, RequestId, RequestRetryQueue, RetryError};
pub use shared::SharedCache;
