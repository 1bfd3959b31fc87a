//! Storage Module
//!
//! This module provides the core storage functionality for DuraKV: the
//! key-value store with TTL support, the background reaper that evicts expired
//! keys, and the snapshot codec and scheduler that make the store survive
//! restarts.
//!
//! ## Architecture
//!
//! ```text
//!          ┌──────────────────────────────────────┐
//!          │                Store                 │
//!          │  Mutex<Keyspace { data, expiry }>    │
//!          └──────────────────────────────────────┘
//!                 ▲                      ▲
//!                 │ evict_expired()      │ save_snapshot()
//!   ┌─────────────┴─────────┐   ┌────────┴──────────────┐
//!   │        Reaper         │   │   SnapshotScheduler   │
//!   │  (Background Task)    │   │  (Background Task)    │
//!   └───────────────────────┘   └────────┬──────────────┘
//!                                        │
//!                                        ▼
//!                               snapshot.json (codec)
//! ```
//!
//! ## Example
//!
//! ```
//! use durakv::storage::{Store, Ttl, Value};
//! use std::time::Duration;
//!
//! let store = Store::new();
//!
//! store.set("greeting", "hello");
//! assert_eq!(store.append("greeting", " world"), Ok(11));
//! assert_eq!(store.get("greeting"), Some(Value::from("hello world")));
//!
//! store.set_with_ttl("session", "token123", Duration::from_secs(3600));
//! assert!(store.persist("session"));
//! assert_eq!(store.ttl("session"), Ttl::Persistent);
//! ```

pub mod engine;
pub mod expiry;
pub mod scheduler;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{
    Store, StoreConfig, StoreError, StoreStats, Ttl, Value, DEFAULT_SNAPSHOT_FILE,
};
pub use expiry::{Reaper, ReaperConfig};
pub use scheduler::{SnapshotConfig, SnapshotScheduler};
pub use snapshot::{Snapshot, SnapshotError};
