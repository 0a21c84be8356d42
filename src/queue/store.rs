//! Persistent queue store.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::PostCandidate;
use crate::persist::{atomic_write_json, load_json, FileLock, StoreError};

use super::entry::{EntryState, QueueEntry};

const QUEUE_FILE_NAME: &str = "queue.json";
const QUEUE_LOCK_NAME: &str = "queue.lock";

/// Errors from queue operations. Store failures propagate untouched: a
/// queue that cannot be trusted fails the run closed.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for the fallback queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Failed attempts after which an entry is moved to the dead state.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl QueueConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    entries: Vec<QueueEntry>,
}

/// Durable, ordered, deduplicated list of posts awaiting redelivery.
///
/// The queue owns its store file exclusively; every mutation runs under the
/// store lock with atomic-replace persistence, mirroring the budget ledger.
#[derive(Debug, Clone)]
pub struct FallbackQueue {
    path: PathBuf,
    lock_path: PathBuf,
    config: QueueConfig,
}

impl FallbackQueue {
    /// Create a queue storing state under `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>, config: QueueConfig) -> Self {
        let state_dir = state_dir.into();
        Self {
            path: state_dir.join(QUEUE_FILE_NAME),
            lock_path: state_dir.join(QUEUE_LOCK_NAME),
            config,
        }
    }

    /// Park a candidate, or record another failed attempt for it.
    ///
    /// Lookup is by the candidate's stable identity: an existing entry gets
    /// its attempt count bumped and reason refreshed in place, never a
    /// duplicate. New entries append in FIFO position. An entry whose
    /// attempts reach the configured ceiling transitions to
    /// [`EntryState::Dead`].
    pub fn enqueue(
        &self,
        candidate: &PostCandidate,
        reason: &str,
    ) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        let id = candidate.stable_identity();
        self.with_state(|state| {
            if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
                entry.attempts += 1;
                entry.reason = reason.to_string();
                entry.last_attempt_at = now;
                if entry.state == EntryState::Pending && entry.attempts >= self.config.max_attempts
                {
                    entry.state = EntryState::Dead;
                    tracing::warn!(
                        id = %entry.id,
                        attempts = entry.attempts,
                        "queue entry exceeded attempt ceiling, moved to dead state"
                    );
                } else {
                    tracing::info!(
                        id = %entry.id,
                        attempts = entry.attempts,
                        reason,
                        "queue entry attempt recorded"
                    );
                }
                entry.clone()
            } else {
                let entry = QueueEntry::new(candidate, reason, now);
                tracing::info!(id = %entry.id, reason, "post parked in fallback queue");
                state.entries.push(entry.clone());
                entry
            }
        })
    }

    /// Peek up to `max_n` of the oldest live entries without removing them.
    ///
    /// Removal happens only via [`FallbackQueue::ack`] after the caller
    /// confirms a successful re-publish.
    pub fn dequeue_batch(&self, max_n: usize) -> Result<Vec<QueueEntry>, QueueError> {
        let state = self.load_state()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.is_live())
            .take(max_n)
            .cloned()
            .collect())
    }

    /// Remove a delivered entry. No-op when already removed, so redelivery
    /// after a crashed ack is safe.
    pub fn ack(&self, entry_id: &str) -> Result<(), QueueError> {
        self.with_state(|state| {
            let before = state.entries.len();
            state.entries.retain(|e| e.id != entry_id);
            if state.entries.len() < before {
                tracing::info!(id = entry_id, "queue entry acknowledged and removed");
            }
        })
    }

    /// Number of live (pending) entries.
    pub fn size(&self) -> Result<usize, QueueError> {
        let state = self.load_state()?;
        Ok(state.entries.iter().filter(|e| e.is_live()).count())
    }

    /// Entries held in the dead state for manual inspection.
    pub fn dead_entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let state = self.load_state()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| !e.is_live())
            .cloned()
            .collect())
    }

    /// All entries in insertion order, live and dead.
    pub fn entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.load_state()?.entries)
    }

    /// Operator purge: drop every entry, returning how many were removed.
    pub fn purge(&self) -> Result<usize, QueueError> {
        self.with_state(|state| {
            let removed = state.entries.len();
            state.entries.clear();
            tracing::info!(removed, "fallback queue purged");
            removed
        })
    }

    fn load_state(&self) -> Result<QueueState, QueueError> {
        Ok(load_json(&self.path)?.unwrap_or_default())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut QueueState) -> T) -> Result<T, QueueError> {
        let _guard = FileLock::acquire(&self.lock_path)?;
        let mut state = self.load_state()?;
        let out = f(&mut state);
        atomic_write_json(&self.path, &state)?;
        Ok(out)
    }
}
