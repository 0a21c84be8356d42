//! Queue entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::PostCandidate;

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting for the next drain cycle.
    Pending,
    /// Exceeded the attempt ceiling; held for manual inspection.
    Dead,
}

/// One parked post awaiting redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Stable identity of the candidate (see
    /// [`PostCandidate::stable_identity`]).
    pub id: String,
    /// The full candidate, sufficient to retry publishing as-is.
    pub candidate: PostCandidate,
    /// Most recent failure reason.
    pub reason: String,
    /// Number of failed publish attempts recorded for this post.
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub state: EntryState,
}

impl QueueEntry {
    pub(crate) fn new(candidate: &PostCandidate, reason: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: candidate.stable_identity(),
            candidate: candidate.clone(),
            reason: reason.to_string(),
            attempts: 1,
            first_failed_at: now,
            last_attempt_at: now,
            state: EntryState::Pending,
        }
    }

    /// Whether the entry is still eligible for automatic redelivery.
    pub fn is_live(&self) -> bool {
        self.state == EntryState::Pending
    }
}
