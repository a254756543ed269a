//! Expiring Cache - snapshot inspection and editing tool
//!
//! Operates on named snapshots holding JSON values keyed by string.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expiring_cache::cli::{self, Args};
use expiring_cache::CacheConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expiring_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.config(CacheConfig::from_env());
    info!(
        dir = ?config.snapshot_dir,
        max_entries = config.maximum_entry_count,
        lifetime_secs = config.entry_lifetime.as_secs(),
        "Configuration loaded"
    );

    let output = cli::run(args.command, config).await?;
    println!("{output}");
    Ok(())
}
