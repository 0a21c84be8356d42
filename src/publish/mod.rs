//! Publishing with bounded retry and rate limiting.
//!
//! The [`Publisher`] drives the publishing collaborator: it classifies
//! HTTP-style failures into retryable and fatal classes, retries the
//! retryable ones with exponential backoff under a local rate limit, and
//! hands the final outcome back to the orchestrator, which decides whether
//! to park the post in the fallback queue.

mod publisher;

pub use publisher::{
    ApiFailure, AuthRefresher, Publisher, PublisherConfig, PublishingApi, PublishOutcome,
};
