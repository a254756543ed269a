//! Integration Tests for the Snapshot Tool
//!
//! Parses argument lists the way the binary does and runs the resulting
//! commands against a temporary snapshot directory.

use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clap::Parser;
use expiring_cache::cache::ManualClock;
use expiring_cache::cli::{run_with_clock, Args};
use expiring_cache::{CacheConfig, CacheStore, SnapshotDir};
use tempfile::tempdir;

// == Helper Functions ==

fn manual_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap())
}

async fn exec(dir: &Path, clock: &ManualClock, argv: &[&str]) -> anyhow::Result<String> {
    let mut full = vec!["expiring-cache", "--dir"];
    let dir = dir.to_str().unwrap();
    full.push(dir);
    full.extend_from_slice(argv);

    let args = Args::try_parse_from(full)?;
    let config = args.config(CacheConfig::default().with_entry_lifetime(Duration::from_secs(60)));
    run_with_clock(args.command, config, clock.as_clock()).await
}

// == Put / Get ==

#[tokio::test]
async fn test_put_then_get() {
    let dir = tempdir().unwrap();
    let clock = manual_clock();

    let saved = exec(dir.path(), &clock, &["put", "settings", "theme", r#"{"dark":true}"#])
        .await
        .unwrap();
    assert!(saved.ends_with("settings.cache"));

    exec(dir.path(), &clock, &["put", "settings", "owner", "alice"])
        .await
        .unwrap();

    let theme = exec(dir.path(), &clock, &["get", "settings", "theme"]).await.unwrap();
    assert_eq!(theme, r#"{"dark":true}"#);
    let owner = exec(dir.path(), &clock, &["get", "settings", "owner"]).await.unwrap();
    assert_eq!(owner, r#""alice""#);

    // The snapshot is readable through the library as well
    let mut store: CacheStore<String, serde_json::Value> = CacheStore::load_with_clock(
        &SnapshotDir::new(dir.path()),
        "settings",
        CacheConfig::default(),
        clock.as_clock(),
    )
    .unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.lookup(&"owner".to_string()),
        Some(serde_json::Value::String("alice".to_string()))
    );
}

#[tokio::test]
async fn test_get_after_expiry_fails() {
    let dir = tempdir().unwrap();
    let clock = manual_clock();

    exec(dir.path(), &clock, &["put", "s", "k", "1"]).await.unwrap();
    clock.advance(Duration::from_secs(60));

    let err = exec(dir.path(), &clock, &["get", "s", "k"]).await.unwrap_err();
    assert!(err.to_string().contains("No live entry"));
}

#[tokio::test]
async fn test_get_from_missing_snapshot_fails() {
    let dir = tempdir().unwrap();
    let err = exec(dir.path(), &manual_clock(), &["get", "nothing", "k"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to open snapshot 'nothing'"));
}

// == Remove / Purge / Inspect / Clear ==

#[tokio::test]
async fn test_remove_purge_inspect_and_clear() {
    let dir = tempdir().unwrap();
    let clock = manual_clock();

    exec(dir.path(), &clock, &["put", "s", "old", "1"]).await.unwrap();
    clock.advance(Duration::from_secs(30));
    exec(dir.path(), &clock, &["put", "s", "new", "2"]).await.unwrap();
    exec(dir.path(), &clock, &["put", "s", "gone", "3"]).await.unwrap();

    assert_eq!(
        exec(dir.path(), &clock, &["remove", "s", "gone"]).await.unwrap(),
        "removed gone"
    );

    clock.advance(Duration::from_secs(30));
    assert_eq!(
        exec(dir.path(), &clock, &["purge", "s"]).await.unwrap(),
        "1 live entries kept"
    );

    let listing = exec(dir.path(), &clock, &["inspect", "s"]).await.unwrap();
    assert!(listing.starts_with("new\t2\texpires "));
    assert!(listing.contains("(30s left)"));
    assert!(listing.ends_with("1 live entries"));

    let cleared = exec(dir.path(), &clock, &["clear", "s"]).await.unwrap();
    assert!(cleared.starts_with("deleted "));
    assert_eq!(
        exec(dir.path(), &clock, &["clear", "s"]).await.unwrap(),
        "no snapshot named 's'"
    );
}

#[tokio::test]
async fn test_snapshot_names_cannot_escape_the_directory() {
    let dir = tempdir().unwrap();
    let snapshots = dir.path().join("snapshots");

    let err = exec(&snapshots, &manual_clock(), &["put", "../outside", "k", "1"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid snapshot name"));
    assert!(!dir.path().join("outside.cache").exists());
}
