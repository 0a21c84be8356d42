//! Durable fallback queue for posts that failed to publish.
//!
//! The queue guarantees eventual delivery without duplication: entries are
//! keyed by the candidate's stable identity so repeated failures of the same
//! logical post update one entry in place, draining peeks without removing,
//! and removal happens only on acknowledged publish or operator purge.
//! Entries past the attempt ceiling become dead and are held for inspection
//! instead of being retried forever or silently dropped.

mod entry;
mod store;

pub use entry::{EntryState, QueueEntry};
pub use store::{FallbackQueue, QueueConfig, QueueError};
