//! Request Retry Queue
//!
//! Keeps outbound requests that could not be delivered in a persisted cache
//! and replays them on demand. Sending is delegated to the caller; a request
//! leaves the queue once a replay of it succeeds or its entry expires.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{system_clock, CacheStore, Clock, SnapshotDir};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::shared::SharedCache;

/// Snapshot name under which pending requests are persisted.
pub const REQUEST_SNAPSHOT_NAME: &str = "cached-requests";

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Request has no URL")]
    MissingUrl,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Random identifier generated for each queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A request as handed to the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A queued request awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
    /// Number of failed replays so far
    pub retry_count: u32,
}

impl PendingRequest {
    /// Rebuilds the outbound request for sending.
    pub fn to_outbound(&self) -> OutboundRequest {
        OutboundRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Persisted queue of requests to retry.
pub struct RequestRetryQueue {
    cache: SharedCache<RequestId, PendingRequest>,
    snapshots: SnapshotDir,
}

impl RequestRetryQueue {
    /// Opens the queue, restoring any requests persisted by a previous run.
    pub async fn open(snapshots: SnapshotDir, config: CacheConfig) -> Result<Self, RetryError> {
        Self::open_with_clock(snapshots, config, system_clock()).await
    }

    pub async fn open_with_clock(
        snapshots: SnapshotDir,
        config: CacheConfig,
        clock: Clock,
    ) -> Result<Self, RetryError> {
        let cache =
            SharedCache::load_or_default(&snapshots, REQUEST_SNAPSHOT_NAME, config, clock).await?;

        Ok(Self { cache, snapshots })
    }

    /// Queues `request` for retry and persists the queue.
    pub async fn enqueue(&self, request: OutboundRequest) -> Result<RequestId, RetryError> {
        if request.url.trim().is_empty() {
            return Err(RetryError::MissingUrl);
        }

        let id = RequestId::new();
        let pending = PendingRequest {
            id,
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            retry_count: 0,
        };
        debug!(id = %id, url = %pending.url, "Queued request for retry");

        self.cache.insert(id, pending).await;
        self.persist().await?;
        Ok(id)
    }

    /// Live pending requests, oldest first.
    pub async fn pending(&self) -> Vec<PendingRequest> {
        self.cache.all_values().await
    }

    pub async fn get(&self, id: &RequestId) -> Option<PendingRequest> {
        self.cache.lookup(id).await
    }

    /// Drops a request without sending it.
    pub async fn remove(&self, id: &RequestId) -> Result<Option<PendingRequest>, RetryError> {
        let removed = self.cache.remove(id).await;
        self.persist().await?;
        Ok(removed)
    }

    /// Sends every pending request through `send`.
    ///
    /// Delivered requests are removed. Failed ones stay queued with their
    /// retry count bumped; being reinserted, they get a fresh lifetime.
    pub async fn replay<F, Fut, E>(&self, mut send: F) -> Result<ReplayReport, RetryError>
    where
        F: FnMut(PendingRequest) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let mut report = ReplayReport::default();

        for request in self.pending().await {
            let id = request.id;
            match send(request.clone()).await {
                Ok(()) => {
                    self.cache.remove(&id).await;
                    report.delivered += 1;
                }
                Err(err) => {
                    warn!(
                        id = %id,
                        retry_count = request.retry_count,
                        error = %err,
                        "Replay failed, keeping request queued"
                    );
                    let retried = PendingRequest {
                        retry_count: request.retry_count.saturating_add(1),
                        ..request
                    };
                    self.cache.insert(id, retried).await;
                    report.failed += 1;
                }
            }
        }

        self.persist().await?;
        info!(
            delivered = report.delivered,
            failed = report.failed,
            "Replay finished"
        );
        Ok(report)
    }

    /// Direct access to the underlying store.
    pub async fn with_store<R>(
        &self,
        f: impl FnOnce(&mut CacheStore<RequestId, PendingRequest>) -> R,
    ) -> R {
        self.cache.with_store(f).await
    }

    async fn persist(&self) -> Result<(), RetryError> {
        self.cache.save(&self.snapshots, REQUEST_SNAPSHOT_NAME).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::tempdir;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 9, 0, 0).unwrap())
    }

    async fn open(dir: &std::path::Path, clock: &ManualClock) -> RequestRetryQueue {
        RequestRetryQueue::open_with_clock(
            SnapshotDir::new(dir),
            CacheConfig::default().with_entry_lifetime(Duration::from_secs(3600)),
            clock.as_clock(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_rejects_missing_url() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), &clock()).await;

        let err = queue.enqueue(OutboundRequest::new("POST", "  ")).await.unwrap_err();
        assert!(matches!(err, RetryError::MissingUrl));
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let queue = open(dir.path(), &clock).await;

        let id = queue
            .enqueue(
                OutboundRequest::new("POST", "https://api.example.com/favorites")
                    .with_header("X-Operation-Name", "AddFavorite")
                    .with_body(br#"{"id":1}"#.to_vec()),
            )
            .await
            .unwrap();

        let reopened = open(dir.path(), &clock).await;
        let pending = reopened.get(&id).await.unwrap();
        assert_eq!(pending.url, "https://api.example.com/favorites");
        assert_eq!(pending.headers["X-Operation-Name"], "AddFavorite");
        assert_eq!(pending.body.as_deref(), Some(&br#"{"id":1}"#[..]));
        assert_eq!(pending.retry_count, 0);
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), &clock()).await;

        let a = queue.enqueue(OutboundRequest::new("GET", "https://a")).await.unwrap();
        let b = queue.enqueue(OutboundRequest::new("GET", "https://b")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(queue.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reopened_queue_keeps_earlier_requests() {
        let dir = tempdir().unwrap();
        let clock = clock();

        // Clock never moves between the two queues
        let first = open(dir.path(), &clock).await;
        let a = first.enqueue(OutboundRequest::new("POST", "https://a")).await.unwrap();
        drop(first);

        let second = open(dir.path(), &clock).await;
        let b = second.enqueue(OutboundRequest::new("POST", "https://b")).await.unwrap();
        assert_ne!(a, b);

        let mut urls: Vec<String> = second.pending().await.into_iter().map(|r| r.url).collect();
        urls.sort();
        assert_eq!(urls, vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueues_all_persist() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let queue = std::sync::Arc::new(open(dir.path(), &clock).await);

        let mut handles = Vec::new();
        for i in 0..16 {
            let queue = std::sync::Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(OutboundRequest::new("PUT", format!("https://host/{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = open(dir.path(), &clock).await;
        assert_eq!(reopened.pending().await.len(), 16);
    }

    #[tokio::test]
    async fn test_replay_removes_delivered_and_keeps_failed() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let queue = open(dir.path(), &clock).await;

        let ok = queue.enqueue(OutboundRequest::new("POST", "https://ok")).await.unwrap();
        let flaky = queue.enqueue(OutboundRequest::new("POST", "https://down")).await.unwrap();

        let report = queue
            .replay(|request| async move {
                if request.url.contains("down") {
                    Err("connection refused")
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(report, ReplayReport { delivered: 1, failed: 1 });
        assert!(queue.get(&ok).await.is_none());
        assert_eq!(queue.get(&flaky).await.unwrap().retry_count, 1);

        // Outcome was persisted
        let reopened = open(dir.path(), &clock).await;
        let pending = reopened.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, flaky);
    }

    #[tokio::test]
    async fn test_expired_requests_are_not_replayed() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let queue = open(dir.path(), &clock).await;

        queue.enqueue(OutboundRequest::new("GET", "https://late")).await.unwrap();
        clock.advance(Duration::from_secs(3600));

        let mut sent = 0;
        let report = queue
            .replay(|_| {
                sent += 1;
                async { Ok::<(), String>(()) }
            })
            .await
            .unwrap();

        assert_eq!(sent, 0);
        assert_eq!(report, ReplayReport::default());
    }

    #[tokio::test]
    async fn test_remove_request() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), &clock()).await;

        let id = queue.enqueue(OutboundRequest::new("GET", "https://x")).await.unwrap();
        let removed = queue.remove(&id).await.unwrap();
        assert_eq!(removed.map(|r| r.to_outbound().url), Some("https://x".to_string()));
        assert!(queue.with_store(|store| store.is_empty()).await);
    }
}
