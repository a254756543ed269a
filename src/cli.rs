//! Snapshot Tool Commands
//!
//! Argument parsing and command execution for the `expiring-cache` binary.
//! Commands return their output instead of printing it.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::cache::{system_clock, Clock, SnapshotDir};
use crate::config::CacheConfig;
use crate::shared::SharedCache;

type JsonCache = SharedCache<String, serde_json::Value>;

/// Inspect and edit named cache snapshots holding JSON values.
#[derive(Parser, Debug)]
#[command(name = "expiring-cache", author, version, about, long_about = None)]
pub struct Args {
    /// Snapshot directory (defaults to CACHE_DIR or the temp directory)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Applies `--dir` on top of `config`.
    pub fn config(&self, config: CacheConfig) -> CacheConfig {
        match &self.dir {
            Some(dir) => config.with_snapshot_dir(dir.clone()),
            None => config,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List live entries with their remaining lifetime
    Inspect { name: String },
    /// Store a JSON value under a key
    Put {
        name: String,
        key: String,
        /// Value as JSON; bare words are stored as strings
        value: String,
    },
    /// Print the value stored under a key
    Get { name: String, key: String },
    /// Remove a key
    Remove { name: String, key: String },
    /// Rewrite the snapshot without its expired entries
    Purge { name: String },
    /// Delete the snapshot
    Clear { name: String },
}

/// Runs `command` against the snapshot directory of `config`.
pub async fn run(command: Command, config: CacheConfig) -> Result<String> {
    run_with_clock(command, config, system_clock()).await
}

pub async fn run_with_clock(
    command: Command,
    config: CacheConfig,
    clock: Clock,
) -> Result<String> {
    let snapshots = SnapshotDir::from_config(&config);

    let output = match command {
        Command::Inspect { name } => {
            let cache = open_existing(&snapshots, &name, config, clock).await?;
            let (now, entries) = cache
                .with_store(|store| (store.now(), store.live_entries()))
                .await;

            let mut out = String::new();
            for entry in &entries {
                let _ = writeln!(
                    out,
                    "{}\t{}\texpires {} ({}s left)",
                    entry.key,
                    entry.value,
                    entry.expiration_date.to_rfc3339(),
                    entry.time_remaining(now).num_seconds()
                );
            }
            let _ = write!(out, "{} live entries", entries.len());
            out
        }
        Command::Put { name, key, value } => {
            let value = parse_value(value);
            let cache = JsonCache::load_or_default(&snapshots, &name, config, clock).await?;
            cache.insert(key, value).await;
            let path = cache.save(&snapshots, &name).await?;
            format!("saved {}", path.display())
        }
        Command::Get { name, key } => {
            let cache = open_existing(&snapshots, &name, config, clock).await?;
            match cache.lookup(&key).await {
                Some(value) => value.to_string(),
                None => bail!("No live entry for key '{key}' in snapshot '{name}'"),
            }
        }
        Command::Remove { name, key } => {
            let cache = open_existing(&snapshots, &name, config, clock).await?;
            if cache.remove(&key).await.is_none() {
                bail!("No live entry for key '{key}' in snapshot '{name}'");
            }
            cache.save(&snapshots, &name).await?;
            format!("removed {key}")
        }
        Command::Purge { name } => {
            let cache = open_existing(&snapshots, &name, config, clock).await?;
            cache.save(&snapshots, &name).await?;
            format!("{} live entries kept", cache.len().await)
        }
        Command::Clear { name } => {
            if snapshots.remove(&name)? {
                format!("deleted {}", snapshots.path_for(&name).display())
            } else {
                format!("no snapshot named '{name}'")
            }
        }
    };

    Ok(output)
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

async fn open_existing(
    snapshots: &SnapshotDir,
    name: &str,
    config: CacheConfig,
    clock: Clock,
) -> Result<JsonCache> {
    JsonCache::load_with_clock(snapshots, name, config, clock)
        .await
        .with_context(|| format!("Failed to open snapshot '{name}'"))
}
