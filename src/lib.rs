//! # DuraKV - A Fault-Tolerant In-Memory Key-Value Store
//!
//! DuraKV keeps string and integer values in memory, expires keys after a
//! per-key TTL, and periodically writes the whole store to a JSON snapshot so
//! it survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              DuraKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Line      │    │                   Store                      │    │
//! │  │   Parser    │    │   Mutex<{ data: HashMap, expiry: HashMap }>  │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! │                              ▲                        ▲                 │
//! │               ┌──────────────┴───────┐   ┌────────────┴────────────┐    │
//! │               │       Reaper         │   │   SnapshotScheduler     │    │
//! │               │ (Background Task)    │   │   (Background Task)     │    │
//! │               └──────────────────────┘   └────────────┬────────────┘    │
//! │                                                       ▼                 │
//! │                                              redis_snapshot.json        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use durakv::connection::{ConnectionStats, Server, DEFAULT_SHUTDOWN_GRACE};
//! use durakv::storage::{Reaper, ReaperConfig, SnapshotConfig, SnapshotScheduler, Store, StoreConfig};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Load the last snapshot (or start empty)
//!     let store = Arc::new(Store::open(StoreConfig::default()));
//!
//!     // Start the background tasks
//!     let reaper = Reaper::start(Arc::clone(&store), ReaperConfig::default());
//!     let snapshots = SnapshotScheduler::start(Arc::clone(&store), SnapshotConfig::default());
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!
//!     // Serve until Ctrl+C; open connections are drained first
//!     Server::new(listener, Arc::clone(&store), stats)
//!         .run_until(async { tokio::signal::ctrl_c().await.unwrap() }, DEFAULT_SHUTDOWN_GRACE)
//!         .await;
//!
//!     reaper.shutdown().await;
//!     snapshots.shutdown().await; // final snapshot
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `set key value [ex seconds]`
//! - `get key`
//! - `delete key` / `del key`
//! - `append key value`
//! - `keys`
//! - `flushall`
//! - `expire key seconds`
//! - `ttl key`
//! - `persist key`
//! - `exists key`
//! - `ping [message]`, `quit`
//!
//! ## Module Overview
//!
//! - [`storage`]: the store, the reaper, the snapshot codec and scheduler
//! - [`commands`]: command table, parsing and execution
//! - [`protocol`]: request line parsing and reply rendering
//! - [`connection`]: client connection management
//!
//! ## Design Highlights
//!
//! ### One Lock Domain
//!
//! Values and expiry records share a single mutex, so a key never outlives its
//! TTL record or vice versa, and every command is atomic.
//!
//! ### Lazy + Eager Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Eager**: The reaper sweeps the expiry table every second
//!
//! ### Best-Effort Durability
//!
//! Snapshots are written atomically (temp file + rename) every 30 seconds, on
//! `flushall`, and at shutdown once every connection has been closed. A failed
//! write is logged and retried; the in-memory store stays authoritative.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandHandler};
pub use connection::{handle_connection, ConnectionStats, Server};
pub use protocol::{LineParser, ParseError, Reply};
pub use storage::{
    Reaper, ReaperConfig, SnapshotConfig, SnapshotScheduler, Store, StoreConfig, Ttl, Value,
};

/// The default port DuraKV listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host DuraKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of DuraKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
