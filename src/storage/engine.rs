//! Thread-Safe Key-Value Store with Expiry Support
//!
//! This module implements the core store for DuraKV: a map of keys to values
//! plus an expiry table holding the deadline of every TTL-bound key.
//!
//! ## Design Decisions
//!
//! 1. **One Lock Domain**: The value map and the expiry table live together in a
//!    single [`Keyspace`] behind one `Mutex`, so a key and its expiry record are
//!    always created and destroyed together.
//! 2. **Lazy Expiry**: Every access checks the deadline first and evicts the key
//!    before answering. The background reaper handles keys nobody touches.
//! 3. **Monotonic Deadlines**: Deadlines are `Instant`s in memory and are only
//!    translated to wall-clock time when a snapshot is written or read.
//! 4. **Ordered Snapshots**: A second lock serializes snapshot writes. It is
//!    always taken before the keyspace lock, and file I/O happens after the
//!    keyspace lock has been released.
//!
//! ## Lock Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Store                      │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ persist: Mutex<Instant>  (last save)   │  │
//! │  └────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ keyspace: Mutex<Keyspace>              │  │
//! │  │   data:   HashMap<String, Value>       │  │
//! │  │   expiry: HashMap<String, Instant>     │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

use crate::storage::snapshot::{self, Snapshot, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default location of the snapshot file.
pub const DEFAULT_SNAPSHOT_FILE: &str = "redis_snapshot.json";

/// A stored value.
///
/// Serialized untagged, so a snapshot holds plain JSON strings and integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A whole number. `append` refuses to touch it.
    Integer(i64),
    /// A string that can be appended to.
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key expires in this many seconds (rounded up, so never zero).
    Remaining(u64),
    /// The key exists and never expires.
    Persistent,
    /// The key does not exist or has expired.
    Missing,
}

impl Ttl {
    /// Returns the classic integer encoding: seconds, `-1` or `-2`.
    pub fn code(&self) -> i64 {
        match self {
            Ttl::Remaining(secs) => i64::try_from(*secs).unwrap_or(i64::MAX),
            Ttl::Persistent => -1,
            Ttl::Missing => -2,
        }
    }
}

/// Expected failures of store commands.
///
/// These are answers, not faults: the store is left untouched when they occur.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key is absent or has expired
    #[error("Key {0} does not exist")]
    KeyNotFound(String),

    /// The operation needs a string but the key holds something else
    #[error("Value for key {0} is not a string")]
    WrongType(String),
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file to load at startup and write to. `None` keeps the store
    /// purely in memory.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_FILE)),
        }
    }
}

impl StoreConfig {
    /// A configuration without any snapshot file.
    pub fn in_memory() -> Self {
        Self {
            snapshot_path: None,
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Number of entries currently held (including expired ones not yet evicted)
    pub keys: usize,
    /// Number of keys carrying a TTL
    pub volatile_keys: usize,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DELETE operations
    pub del_ops: u64,
    /// Total keys evicted because their TTL elapsed
    pub expired: u64,
    /// Total snapshots written successfully
    pub snapshots: u64,
}

/// The guarded state: values and their deadlines.
///
/// Invariant: every key in `expiry` is also in `data`.
#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Value>,
    expiry: HashMap<String, Instant>,
}

impl Keyspace {
    #[inline]
    fn is_expired(&self, key: &str, now: Instant) -> bool {
        self.expiry
            .get(key)
            .map(|deadline| *deadline <= now)
            .unwrap_or(false)
    }

    #[inline]
    fn is_live(&self, key: &str, now: Instant) -> bool {
        self.data.contains_key(key) && !self.is_expired(key, now)
    }

    /// Removes a key together with its expiry record.
    fn remove(&mut self, key: &str) -> Option<Value> {
        self.expiry.remove(key);
        self.data.remove(key)
    }

    /// Evicts `key` if its deadline has passed. Returns `true` if it did.
    fn evict_if_expired(&mut self, key: &str, now: Instant) -> bool {
        if self.is_expired(key, now) {
            self.remove(key);
            true
        } else {
            false
        }
    }

    /// Copies the live keyspace into its on-disk form.
    fn capture(&self) -> Snapshot {
        let now = Instant::now();
        let unix_now = unix_now();

        let mut snapshot = Snapshot::default();
        for (key, value) in &self.data {
            if self.is_expired(key, now) {
                continue;
            }
            snapshot.data.insert(key.clone(), value.clone());
            if let Some(deadline) = self.expiry.get(key) {
                let remaining = deadline.saturating_duration_since(now);
                snapshot
                    .expiry
                    .insert(key.clone(), unix_now + remaining.as_secs_f64());
            }
        }
        snapshot
    }

    /// Rebuilds a keyspace from a snapshot.
    ///
    /// Wall-clock deadlines are converted back to monotonic ones; keys whose
    /// deadline passed while the process was down are dropped. Returns the
    /// keyspace and the number of keys dropped.
    fn restore(snapshot: Snapshot) -> (Self, usize) {
        let now = Instant::now();
        let unix_now = unix_now();

        let mut keyspace = Keyspace {
            data: snapshot.data.into_iter().collect(),
            expiry: HashMap::new(),
        };
        let mut dropped = 0;

        for (key, expires_at) in snapshot.expiry {
            if !keyspace.data.contains_key(&key) {
                debug!(key = %key, "Ignoring expiry record without a value");
                continue;
            }

            let remaining = expires_at - unix_now;
            if remaining <= 0.0 {
                keyspace.data.remove(&key);
                dropped += 1;
                continue;
            }

            match Duration::try_from_secs_f64(remaining)
                .ok()
                .and_then(|ttl| now.checked_add(ttl))
            {
                Some(deadline) => {
                    keyspace.expiry.insert(key, deadline);
                }
                None => {
                    warn!(key = %key, expires_at, "Unrepresentable expiry, keeping key without TTL");
                }
            }
        }

        (keyspace, dropped)
    }
}

/// Seconds since the Unix epoch, as stored in snapshot files.
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Deadline for a TTL starting now. A TTL too large to represent never expires.
#[inline]
fn deadline_after(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

/// Seconds left until `deadline`, rounded up.
fn remaining_secs(deadline: Instant, now: Instant) -> u64 {
    let remaining = deadline.saturating_duration_since(now);
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// The DuraKV store.
///
/// Wrap it in an `Arc` and hand clones to the command handlers, the
/// [`Reaper`](crate::storage::Reaper) and the
/// [`SnapshotScheduler`](crate::storage::SnapshotScheduler). Every operation
/// runs under one lock acquisition and is linearizable.
///
/// # Example
///
/// ```
/// use durakv::storage::{Store, Ttl, Value};
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set("name", "durakv");
/// assert_eq!(store.get("name"), Some(Value::from("durakv")));
///
/// store.set_with_ttl("session", "abc123", Duration::from_secs(60));
/// assert!(matches!(store.ttl("session"), Ttl::Remaining(_)));
/// ```
pub struct Store {
    /// Values and deadlines
    keyspace: Mutex<Keyspace>,

    /// Snapshot file, if any
    snapshot_path: Option<PathBuf>,

    /// Serializes snapshot writes; holds the time of the last successful save
    persist: Mutex<Instant>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
    snapshot_count: AtomicU64,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.len())
            .field("snapshot_path", &self.snapshot_path)
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store that never touches the disk.
    pub fn new() -> Self {
        Self::with_keyspace(Keyspace::default(), None)
    }

    /// Opens a store, loading its snapshot file if one is configured.
    ///
    /// A missing snapshot yields an empty store. So does an unreadable or
    /// malformed one: the failure is logged and startup continues.
    pub fn open(config: StoreConfig) -> Self {
        let keyspace = match &config.snapshot_path {
            Some(path) => load_keyspace(path),
            None => Keyspace::default(),
        };
        Self::with_keyspace(keyspace, config.snapshot_path)
    }

    fn with_keyspace(keyspace: Keyspace, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            keyspace: Mutex::new(keyspace),
            snapshot_path,
            persist: Mutex::new(Instant::now()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            snapshot_count: AtomicU64::new(0),
        }
    }

    /// Locks the keyspace.
    ///
    /// Every critical section leaves both maps consistent after each
    /// statement, so a poisoned lock is safe to keep using.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.keyspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn lock_persist(&self) -> MutexGuard<'_, Instant> {
        self.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lazy expiry: evicts `key` if its TTL has elapsed.
    fn expire_lazily(&self, keyspace: &mut Keyspace, key: &str, now: Instant) -> bool {
        if keyspace.evict_if_expired(key, now) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Key expired on access");
            true
        } else {
            false
        }
    }

    /// Sets a key to a value and removes any TTL it had.
    ///
    /// Overwrites the previous value whatever its type.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        self.insert(key.into(), value.into(), None)
    }

    /// Sets a key to a value that expires after `ttl`.
    ///
    /// Any previous TTL is replaced.
    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> bool {
        self.insert(key.into(), value.into(), Some(ttl))
    }

    fn insert(&self, key: String, value: Value, ttl: Option<Duration>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut keyspace = self.lock();
        let is_new = !keyspace.is_live(&key, now);

        match ttl.map(|ttl| (ttl, deadline_after(now, ttl))) {
            Some((ttl, Some(deadline))) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Set key with TTL");
                keyspace.expiry.insert(key.clone(), deadline);
            }
            Some((ttl, None)) => {
                warn!(key = %key, ttl_secs = ttl.as_secs(), "TTL out of range, key will not expire");
                keyspace.expiry.remove(&key);
            }
            None => {
                debug!(key = %key, "Set key without TTL");
                keyspace.expiry.remove(&key);
            }
        }
        keyspace.data.insert(key, value);

        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired; an expired key
    /// is removed before returning.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.lock();
        if self.expire_lazily(&mut keyspace, key, Instant::now()) {
            return None;
        }

        let value = keyspace.data.get(key).cloned();
        if value.is_none() {
            debug!(key = %key, "Key not found");
        }
        value
    }

    /// Deletes a key and its TTL.
    ///
    /// Returns the removed value, or `None` if there was nothing to delete.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.lock();
        if self.expire_lazily(&mut keyspace, key, Instant::now()) {
            return None;
        }

        let removed = keyspace.remove(key);
        if removed.is_some() {
            debug!(key = %key, "Deleted key");
        }
        removed
    }

    /// Appends to an existing string value.
    ///
    /// # Returns
    ///
    /// The length of the string after the append, in characters.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if the key is absent (it is not created) and
    /// [`StoreError::WrongType`] if it holds a non-string value, which is left
    /// unchanged.
    pub fn append(&self, key: &str, suffix: &str) -> Result<usize, StoreError> {
        let mut keyspace = self.lock();
        self.expire_lazily(&mut keyspace, key, Instant::now());

        match keyspace.data.get_mut(key) {
            Some(Value::String(current)) => {
                current.push_str(suffix);
                debug!(key = %key, "Appended to key");
                Ok(current.chars().count())
            }
            Some(_) => {
                let err = StoreError::WrongType(key.to_string());
                warn!("{}", err);
                Err(err)
            }
            None => {
                let err = StoreError::KeyNotFound(key.to_string());
                warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Returns every live key, sorted.
    ///
    /// Expiry is judged against a single instant and nothing is evicted here;
    /// expired keys are just left out.
    pub fn keys(&self) -> Vec<String> {
        let keyspace = self.lock();
        let now = Instant::now();

        let mut keys: Vec<String> = keyspace
            .data
            .keys()
            .filter(|key| !keyspace.is_expired(key, now))
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Clears every key and TTL, then writes a snapshot of the empty store.
    ///
    /// A failed snapshot write is logged; the flush itself always succeeds.
    pub fn flushall(&self) {
        let mut last_save = self.lock_persist();

        let cleared = {
            let mut keyspace = self.lock();
            let cleared = keyspace.data.len();
            keyspace.data.clear();
            keyspace.expiry.clear();
            cleared
        };
        info!(cleared, "Executed FLUSHALL");

        if let Err(e) = self.write_snapshot(&Snapshot::default(), &mut last_save) {
            error!(error = %e, "Error saving snapshot after FLUSHALL");
        }
    }

    /// Sets or replaces the TTL of an existing key.
    ///
    /// Returns `false` if the key doesn't exist.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut keyspace = self.lock();
        self.expire_lazily(&mut keyspace, key, now);

        if !keyspace.data.contains_key(key) {
            debug!(key = %key, "Key not found for expire");
            return false;
        }

        match deadline_after(now, ttl) {
            Some(deadline) => {
                keyspace.expiry.insert(key.to_string(), deadline);
            }
            None => {
                warn!(key = %key, ttl_secs = ttl.as_secs(), "TTL out of range, key will not expire");
                keyspace.expiry.remove(key);
                return true;
            }
        }
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Set TTL for key");
        true
    }

    /// Gets the remaining TTL of a key.
    ///
    /// Like `get`, this evicts the key if its TTL has already elapsed.
    pub fn ttl(&self, key: &str) -> Ttl {
        let now = Instant::now();
        let mut keyspace = self.lock();

        if self.expire_lazily(&mut keyspace, key, now) {
            return Ttl::Missing;
        }
        if !keyspace.data.contains_key(key) {
            return Ttl::Missing;
        }

        match keyspace.expiry.get(key) {
            Some(deadline) => Ttl::Remaining(remaining_secs(*deadline, now)),
            None => Ttl::Persistent,
        }
    }

    /// Removes the TTL from a key, making it permanent.
    ///
    /// Returns `false` if the key doesn't exist or had no TTL.
    pub fn persist(&self, key: &str) -> bool {
        let mut keyspace = self.lock();
        self.expire_lazily(&mut keyspace, key, Instant::now());

        if !keyspace.data.contains_key(key) {
            debug!(key = %key, "Key not found for persist");
            return false;
        }

        let removed = keyspace.expiry.remove(key).is_some();
        if removed {
            debug!(key = %key, "Removed TTL for key");
        }
        removed
    }

    /// Checks whether a key exists, evicting it if it has expired.
    pub fn exists(&self, key: &str) -> bool {
        let mut keyspace = self.lock();
        if self.expire_lazily(&mut keyspace, key, Instant::now()) {
            return false;
        }
        keyspace.data.contains_key(key)
    }

    /// Removes every key whose TTL has elapsed.
    ///
    /// This is the reaper's sweep. It runs under one lock acquisition.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn evict_expired(&self) -> u64 {
        let now = Instant::now();
        let mut keyspace = self.lock();

        let expired: Vec<String> = keyspace
            .expiry
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            keyspace.remove(key);
            debug!(key = %key, "Key expired and removed");
        }

        let count = expired.len() as u64;
        if count > 0 {
            self.expired_count.fetch_add(count, Ordering::Relaxed);
        }
        count
    }

    /// Writes the current state to the snapshot file.
    ///
    /// State is copied under the keyspace lock and written after releasing
    /// it. Does nothing for an in-memory store.
    pub fn save_snapshot(&self) -> Result<(), SnapshotError> {
        let mut last_save = self.lock_persist();
        if self.snapshot_path.is_none() {
            return Ok(());
        }

        let snapshot = self.lock().capture();
        self.write_snapshot(&snapshot, &mut last_save)
    }

    /// Must be called with the persist lock held.
    fn write_snapshot(
        &self,
        snapshot: &Snapshot,
        last_save: &mut Instant,
    ) -> Result<(), SnapshotError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        snapshot::save(path, snapshot)?;
        *last_save = Instant::now();
        self.snapshot_count.fetch_add(1, Ordering::Relaxed);
        info!(path = %path.display(), keys = snapshot.data.len(), "Snapshot saved successfully");
        Ok(())
    }

    /// Time elapsed since the last successful snapshot (or since the store
    /// was opened, if none has been written).
    pub fn since_last_save(&self) -> Duration {
        self.lock_persist().elapsed()
    }

    /// The snapshot file this store writes to, if any.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Returns the number of entries held, including expired keys that have
    /// not been evicted yet.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        let (keys, volatile_keys) = {
            let keyspace = self.lock();
            (keyspace.data.len(), keyspace.expiry.len())
        };

        StoreStats {
            keys,
            volatile_keys,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            snapshots: self.snapshot_count.load(Ordering::Relaxed),
        }
    }

    /// Panics while holding the keyspace lock, leaving it poisoned.
    #[cfg(test)]
    pub(crate) fn panic_while_locked(&self) {
        let _keyspace = self.lock();
        panic!("panicked while holding the keyspace lock");
    }

    /// Number of expiry records whose key has no value. Always zero.
    #[cfg(test)]
    pub(crate) fn dangling_expiry_records(&self) -> usize {
        let keyspace = self.lock();
        keyspace
            .expiry
            .keys()
            .filter(|key| !keyspace.data.contains_key(*key))
            .count()
    }
}

/// Startup load. Never fails: problems are logged and yield an empty keyspace.
fn load_keyspace(path: &Path) -> Keyspace {
    match snapshot::load(path) {
        Ok(Some(snapshot)) => {
            let (keyspace, dropped) = Keyspace::restore(snapshot);
            info!(
                path = %path.display(),
                keys = keyspace.data.len(),
                expired_while_down = dropped,
                "Loaded snapshot"
            );
            keyspace
        }
        Ok(None) => {
            info!(path = %path.display(), "No snapshot found, starting with an empty store");
            Keyspace::default()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error loading snapshot, starting with an empty store");
            Keyspace::default()
        }
    }
}
