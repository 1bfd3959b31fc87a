//! DuraKV - A Fault-Tolerant In-Memory Key-Value Store
//!
//! This is the main entry point for the DuraKV server.
//! It loads the last snapshot, starts the background tasks, and handles
//! incoming connections until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use durakv::connection::{ConnectionStats, Server, DEFAULT_SHUTDOWN_GRACE};
use durakv::storage::{
    Reaper, ReaperConfig, SnapshotConfig, SnapshotScheduler, Store, StoreConfig,
    DEFAULT_SNAPSHOT_FILE,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

/// Server configuration
#[derive(Parser, Debug)]
#[command(name = "durakv", author, version, about, long_about = None)]
struct Config {
    /// Host to bind to
    #[arg(long, default_value = durakv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = durakv::DEFAULT_PORT)]
    port: u16,

    /// Snapshot file loaded at startup and rewritten periodically
    #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot_file: PathBuf,

    /// Seconds between periodic snapshots
    #[arg(long, default_value_t = 30)]
    snapshot_interval: u64,

    /// Milliseconds between expired-key sweeps
    #[arg(long, default_value_t = 1000)]
    reap_interval_ms: u64,

    /// Run purely in memory: no snapshot is loaded or written
    #[arg(long)]
    no_snapshot: bool,

    /// Seconds open connections get to finish on shutdown
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
    shutdown_grace: u64,
}

impl Config {
    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn store_config(&self) -> StoreConfig {
        if self.no_snapshot {
            StoreConfig::in_memory()
        } else {
            StoreConfig {
                snapshot_path: Some(self.snapshot_file.clone()),
            }
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
DuraKV v{} - Fault-Tolerant In-Memory Key-Value Store
──────────────────────────────────────────────────────
Server started on {}
Snapshots: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        durakv::VERSION,
        config.bind_address(),
        if config.no_snapshot {
            "disabled".to_string()
        } else {
            config.snapshot_file.display().to_string()
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging; RUST_LOG overrides the default level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load the store (shared across all connections)
    let store = Arc::new(Store::open(config.store_config()));
    info!(keys = store.len(), "Store initialized");

    // Start the background tasks
    let reaper = Reaper::start(
        Arc::clone(&store),
        ReaperConfig {
            interval: Duration::from_millis(config.reap_interval_ms.max(1)),
        },
    );
    let scheduler = store.snapshot_path().is_some().then(|| {
        SnapshotScheduler::start(
            Arc::clone(&store),
            SnapshotConfig {
                interval: Duration::from_secs(config.snapshot_interval.max(1)),
            },
        )
    });

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    // Serve until Ctrl+C, then drain connections
    let server = Server::new(listener, Arc::clone(&store), Arc::clone(&stats));
    server
        .run_until(
            async {
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutdown signal received, stopping server...");
            },
            Duration::from_secs(config.shutdown_grace),
        )
        .await;

    // Reaper first, then the final snapshot
    reaper.shutdown().await;
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    let store_stats = store.stats();
    let connections = stats.summary();
    info!(
        keys = store_stats.keys,
        expired = store_stats.expired,
        snapshots = store_stats.snapshots,
        connections = connections.accepted,
        commands = connections.commands,
        errors = connections.errors,
        "Server shutdown complete"
    );
    Ok(())
}
