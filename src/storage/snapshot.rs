//! Snapshot Codec
//!
//! Reads and writes the whole store as a single JSON document:
//!
//! ```json
//! {
//!   "data":   { "name": "durakv", "count": 3, "session": "token" },
//!   "expiry": { "session": 1767225600.25 }
//! }
//! ```
//!
//! `expiry` maps a key to its absolute deadline in Unix seconds, so a restart
//! naturally accounts for the time the process was down. Unknown top-level
//! fields are ignored. Entries are checked one at a time: a value that is
//! neither a string nor an integer, or a deadline that is not a number, is
//! skipped with a warning and the rest of the file still loads.
//!
//! Writes go to a sibling `.tmp` file which is synced and then renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.

use crate::storage::engine::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// A point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Every key and its value
    pub data: BTreeMap<String, Value>,

    /// Deadline of every TTL-bound key, in seconds since the Unix epoch
    pub expiry: BTreeMap<String, f64>,
}

/// The file as read, before entries are checked.
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    expiry: BTreeMap<String, serde_json::Value>,
}

impl From<RawSnapshot> for Snapshot {
    fn from(raw: RawSnapshot) -> Self {
        let mut snapshot = Snapshot::default();

        for (key, raw_value) in raw.data {
            match serde_json::from_value::<Value>(raw_value) {
                Ok(value) => {
                    snapshot.data.insert(key, value);
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping unsupported snapshot value"),
            }
        }

        for (key, raw_deadline) in raw.expiry {
            match raw_deadline.as_f64() {
                Some(deadline) => {
                    snapshot.expiry.insert(key, deadline);
                }
                None => warn!(key = %key, "Skipping non-numeric snapshot deadline"),
            }
        }

        snapshot
    }
}

/// Errors that can occur while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem error (permissions, disk full, ...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a valid snapshot
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads a snapshot file.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let raw: RawSnapshot = serde_json::from_slice(&bytes)?;
    Ok(Some(raw.into()))
}

/// Replaces the snapshot file with `snapshot`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp_path = tmp_path_for(path);

    let result = write_synced(&tmp_path, &json).and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    Ok(result?)
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// `snapshot.json` -> `snapshot.json.tmp`
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded = load(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut snapshot = Snapshot::default();
        snapshot.data.insert("name".to_string(), Value::from("durakv"));
        snapshot.data.insert("count".to_string(), Value::Integer(3));
        snapshot.expiry.insert("name".to_string(), 1_900_000_000.5);

        save(&path, &snapshot).unwrap();

        assert_eq!(load(&path).unwrap(), Some(snapshot));
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn test_file_is_plain_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut snapshot = Snapshot::default();
        snapshot.data.insert("s".to_string(), Value::from("text"));
        snapshot.data.insert("n".to_string(), Value::Integer(5));
        save(&path, &snapshot).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["data"]["s"], "text");
        assert_eq!(raw["data"]["n"], 5);
        assert!(raw["expiry"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_load_ignores_unknown_fields_and_missing_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            br#"{"data": {"k": "v"}, "sorted_sets": {}}"#,
        )
        .unwrap();

        let snapshot = load(&path).unwrap().unwrap();
        assert_eq!(snapshot.data.get("k"), Some(&Value::from("v")));
        assert!(snapshot.expiry.is_empty());
    }

    #[test]
    fn test_load_skips_unsupported_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            br#"{
                "data": {"a": "x", "n": 7, "f": 1.5, "b": true, "z": null, "l": [1]},
                "expiry": {"a": 1900000000.0, "n": "soon"}
            }"#,
        )
        .unwrap();

        let snapshot = load(&path).unwrap().unwrap();
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.data.get("a"), Some(&Value::from("x")));
        assert_eq!(snapshot.data.get("n"), Some(&Value::Integer(7)));
        assert_eq!(snapshot.expiry.len(), 1);
        assert_eq!(snapshot.expiry.get("a"), Some(&1_900_000_000.0));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, b"[1, 2").unwrap();

        assert!(matches!(load(&path), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn test_save_overwrites_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut big = Snapshot::default();
        for i in 0..100 {
            big.data.insert(format!("key{}", i), Value::from("value"));
        }
        save(&path, &big).unwrap();
        save(&path, &Snapshot::default()).unwrap();

        assert_eq!(load(&path).unwrap(), Some(Snapshot::default()));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("snapshot.json");

        assert!(matches!(
            save(&path, &Snapshot::default()),
            Err(SnapshotError::Io(_))
        ));
    }
}
