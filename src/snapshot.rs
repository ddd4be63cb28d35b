//! Persisted snapshot of fetched datasets.
//!
//! One JSON file holds the whole cache: a `last_update` wall-clock string
//! plus one array of raw records per dataset. The file is replaced wholesale
//! on every refresh and never partially updated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// `last_update` format: naive local wall clock, minute precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot file: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The persisted cache unit: capture time plus per-dataset record arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub last_update: String,
    #[serde(flatten)]
    pub payloads: BTreeMap<String, Vec<Value>>,
}

impl Snapshot {
    pub fn new(captured_at: NaiveDateTime, payloads: BTreeMap<String, Vec<Value>>) -> Self {
        Snapshot {
            last_update: captured_at.format(TIMESTAMP_FORMAT).to_string(),
            payloads,
        }
    }

    /// Parse the persisted capture time. `None` when the stored string does
    /// not match the expected format; callers treat that as "no prior
    /// snapshot" for freshness purposes.
    pub fn captured_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.last_update, TIMESTAMP_FORMAT).ok()
    }

    pub fn records(&self, dataset: &str) -> &[Value] {
        self.payloads.get(dataset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when every dataset array is empty (e.g. after a total outage).
    pub fn is_empty(&self) -> bool {
        self.payloads.values().all(Vec::is_empty)
    }
}

/// Truncate to minute precision to match what `last_update` can express.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Reads and writes the snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        SnapshotStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted snapshot. `Ok(None)` when the file does not exist;
    /// `Err` when it exists but cannot be read or parsed, so the caller can
    /// log before degrading to "no prior snapshot".
    pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Replace the snapshot file in place.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(snapshot)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
