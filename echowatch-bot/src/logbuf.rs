//! Bounded in-memory structured-event log with an append-only disk mirror.
//!
//! The ring answers `recent-logs` queries; the mirror (one JSON object per
//! line) is the unbounded audit trail. A mirror write failure is reported
//! through the process's own error channel only — it must never raise, or a
//! failing disk would take the logging path down with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DEFAULT_RECENT: usize = 20;
pub const MAX_RECENT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct LogBuffer {
    ring: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
    mirror_path: PathBuf,
}

impl LogBuffer {
    pub fn new(capacity: usize, mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            mirror_path: mirror_path.into(),
        }
    }

    /// Append an event to the ring (evicting the oldest on overflow) and to
    /// the disk mirror. `metadata` should be a JSON object; anything else is
    /// wrapped under a `"value"` key.
    pub fn record(&self, level: LogLevel, msg: impl Into<String>, metadata: serde_json::Value) {
        let entry = LogEntry {
            ts: Utc::now(),
            level,
            msg: msg.into(),
            metadata: normalize_metadata(metadata),
        };

        self.mirror(&entry);

        let mut ring = self.lock();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// The `n` most recent entries, oldest-first. `n` is clamped to
    /// [1, MAX_RECENT].
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let n = n.clamp(1, MAX_RECENT);
        let ring = self.lock();
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn mirror(&self, entry: &LogEntry) {
        let result = serde_json::to_string(entry).map_err(std::io::Error::other).and_then(|line| {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.mirror_path)?;
            writeln!(file, "{line}")
        });

        if let Err(e) = result {
            // Never raise from here.
            tracing::error!(
                path = %self.mirror_path.display(),
                error = %e,
                "Failed to append to log mirror"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize_metadata(metadata: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
