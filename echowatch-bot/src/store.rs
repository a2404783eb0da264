//! Durable session store — the single shared mutable resource of the bridge.
//!
//! Maps PIN → session metadata plus a runtime-only cancellation flag. All
//! mutation goes through one mutex (single-writer discipline), including the
//! snapshot write, so concurrent command handlers and polling loops cannot
//! lose updates to the snapshot file.
//!
//! Snapshot layout (consumed by external tooling): an ordered JSON list of
//! `{pin, channelId, messageId, userId, createdAt}`. The cancellation flag
//! is never persisted — after a restart no cancellation is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Local tracking record for one in-flight PIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub pin: String,
    pub channel_id: String,
    /// Status message edited in place across the session lifecycle.
    pub message_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("a session for PIN {0} is already active")]
    AlreadyActive(String),

    #[error("failed to persist session snapshot: {0}")]
    PersistFailure(String),
}

struct ActiveSession {
    session: Session,
    cancelled: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, ActiveSession>>>,
    snapshot_path: PathBuf,
}

impl SessionStore {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            snapshot_path: snapshot_path.into(),
        }
    }

    /// Load the snapshot at `snapshot_path`, skipping malformed entries.
    /// A missing file yields an empty store.
    pub fn restore(snapshot_path: impl Into<PathBuf>) -> Self {
        let store = Self::new(snapshot_path);

        let raw = match std::fs::read_to_string(&store.snapshot_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %store.snapshot_path.display(),
                    "No session snapshot found; starting empty"
                );
                return store;
            }
            Err(e) => {
                tracing::error!(
                    path = %store.snapshot_path.display(),
                    error = %e,
                    "Failed to read session snapshot; starting empty"
                );
                return store;
            }
        };

        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                tracing::error!(error = %e, "Session snapshot is not a JSON list; starting empty");
                return store;
            }
        };

        let mut recovered = 0usize;
        let mut skipped = 0usize;
        {
            let mut inner = store.lock();
            for value in values {
                match serde_json::from_value::<Session>(value) {
                    Ok(session) => {
                        inner.insert(
                            session.pin.clone(),
                            ActiveSession {
                                session,
                                cancelled: Arc::new(AtomicBool::new(false)),
                            },
                        );
                        recovered += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed session snapshot entry");
                        skipped += 1;
                    }
                }
            }
        }

        tracing::info!(recovered, skipped, "Restored session snapshot");
        store
    }

    /// Register a new session. Fails if the PIN already has a live session;
    /// the store is unchanged on failure. Returns the cancellation flag the
    /// owning loop should watch.
    pub fn create(&self, session: Session) -> Result<Arc<AtomicBool>, StoreError> {
        let mut inner = self.lock();
        if inner.contains_key(&session.pin) {
            return Err(StoreError::AlreadyActive(session.pin));
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        inner.insert(
            session.pin.clone(),
            ActiveSession {
                session,
                cancelled: cancelled.clone(),
            },
        );
        Ok(cancelled)
    }

    /// Set the cancellation flag for `pin`. Idempotent: an absent PIN is a
    /// no-op success. Returns whether a live session was flagged.
    pub fn mark_cancelled(&self, pin: &str) -> bool {
        match self.lock().get(pin) {
            Some(active) => {
                active.cancelled.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pin: &str) -> bool {
        self.lock().contains_key(pin)
    }

    /// Cancellation flag for a restored session (used when resuming loops).
    pub fn cancellation_handle(&self, pin: &str) -> Option<Arc<AtomicBool>> {
        self.lock().get(pin).map(|a| a.cancelled.clone())
    }

    pub fn remove(&self, pin: &str) -> Option<Session> {
        self.lock().remove(pin).map(|a| a.session)
    }

    /// All live sessions, ordered by creation time (then PIN for stability).
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            self.lock().values().map(|a| a.session.clone()).collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.pin.cmp(&b.pin))
        });
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomically overwrite the on-disk snapshot with the current in-memory
    /// set (write to a temp file, then rename). Runs under the store lock so
    /// snapshot writes are serialized with mutations.
    pub fn persist(&self) -> Result<(), StoreError> {
        let inner = self.lock();
        let mut sessions: Vec<&Session> = inner.values().map(|a| &a.session).collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.pin.cmp(&b.pin))
        });

        let body = serde_json::to_vec_pretty(&sessions)
            .map_err(|e| StoreError::PersistFailure(e.to_string()))?;

        let tmp_path = temp_path(&self.snapshot_path);
        std::fs::write(&tmp_path, body).map_err(|e| StoreError::PersistFailure(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.snapshot_path)
            .map_err(|e| StoreError::PersistFailure(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

// ============================================================================
// TESTS
// ============================================================================
