//! Publishing API driver.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::PostCandidate;
use crate::retry::RetryPolicy;

/// A classified failure from the publishing API.
///
/// The variant decides the retry behavior: `RateLimited`, `Server` and
/// `Transport` are transient; `Validation` and `Unexpected` are not fixable
/// by retrying identical input; `Unauthorized` is fatal unless a token
/// refresh succeeds.
#[derive(Error, Debug)]
pub enum ApiFailure {
    /// 401: the access token was rejected.
    #[error("authentication rejected: {body}")]
    Unauthorized { body: String },

    /// 429: the platform asked us to back off.
    #[error("rate limited by platform")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 4xx: the payload itself was rejected (bad image URL, oversized field).
    #[error("validation rejected ({status}): {body}")]
    Validation { status: u16, body: String },

    /// 5xx: transient server-side failure.
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Network-level failure (timeout, connection reset).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Anything else the platform returned.
    #[error("unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl ApiFailure {
    /// Map an HTTP status and body to the failure taxonomy.
    pub fn from_status(status: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            401 => ApiFailure::Unauthorized { body },
            429 => ApiFailure::RateLimited { retry_after_secs },
            400..=499 => ApiFailure::Validation { status, body },
            500..=599 => ApiFailure::Server { status, body },
            _ => ApiFailure::Unexpected { status, body },
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiFailure::RateLimited { .. } | ApiFailure::Server { .. } | ApiFailure::Transport(_)
        )
    }
}

/// Result of one publish invocation, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The post is live under the returned platform ID.
    Published { post_id: String },
    /// Transient failure persisted past the internal retry budget; the
    /// caller decides whether to park the post for a later drain.
    Retryable { reason: String },
    /// Retrying identical input will not help; operator attention needed.
    Fatal { reason: String },
}

/// The publishing platform, one API call per invocation.
#[async_trait]
pub trait PublishingApi: Send + Sync {
    async fn create_post(&self, candidate: &PostCandidate) -> Result<String, ApiFailure>;
}

/// Collaborator that can mint a fresh access token after a 401.
#[async_trait]
pub trait AuthRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), String>;
}

/// Configuration for the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Total call attempts per publish invocation (first try included).
    pub max_attempts: u32,
    /// Base backoff delay between retryable attempts, in milliseconds.
    pub backoff_base_ms: u64,
    /// Cap on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Local requests-per-minute ceiling; the platform documents ~5/min.
    pub rate_limit_rpm: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            max_delay_ms: 60_000,
            rate_limit_rpm: 5,
        }
    }
}

impl PublisherConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base backoff delay.
    pub fn with_backoff_base_ms(mut self, base_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self
    }

    /// Set the local rate limit.
    pub fn with_rate_limit_rpm(mut self, rpm: u32) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }
}

/// Drives the publishing API with bounded retry and local rate limiting.
pub struct Publisher {
    api: Arc<dyn PublishingApi>,
    refresher: Option<Arc<dyn AuthRefresher>>,
    config: PublisherConfig,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl Publisher {
    /// Create a publisher over the given API collaborator.
    pub fn new(api: Arc<dyn PublishingApi>, config: PublisherConfig) -> Self {
        let rpm = NonZeroU32::new(config.rate_limit_rpm)
            .unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
        Self {
            api,
            refresher: None,
            config,
            limiter,
        }
    }

    /// Attach the token-refresh collaborator used on a 401.
    pub fn with_auth_refresher(mut self, refresher: Arc<dyn AuthRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Publish a candidate.
    ///
    /// Retryable failures are re-attempted up to the configured ceiling
    /// with exponential backoff; exhaustion surfaces as
    /// [`PublishOutcome::Retryable`] so the caller can park the post. A 401
    /// triggers at most one token refresh followed by one immediate retry.
    pub async fn publish(&self, candidate: &PostCandidate) -> PublishOutcome {
        let policy = RetryPolicy::new()
            .with_max_retries(self.config.max_attempts.saturating_sub(1))
            .with_backoff_base_ms(self.config.backoff_base_ms)
            .with_max_delay_ms(self.config.max_delay_ms);

        let mut refreshed = false;
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;
            match self.api.create_post(candidate).await {
                Ok(post_id) => {
                    tracing::info!(post_id = %post_id, topic = %candidate.topic, "post published");
                    return PublishOutcome::Published { post_id };
                }
                Err(ApiFailure::Unauthorized { body }) => {
                    if !refreshed {
                        if let Some(refresher) = &self.refresher {
                            match refresher.refresh().await {
                                Ok(()) => {
                                    tracing::info!("access token refreshed after 401, retrying once");
                                    refreshed = true;
                                    continue;
                                }
                                Err(err) => {
                                    return PublishOutcome::Fatal {
                                        reason: format!("token refresh failed: {err}"),
                                    };
                                }
                            }
                        }
                    }
                    return PublishOutcome::Fatal {
                        reason: format!("authentication rejected: {body}"),
                    };
                }
                Err(err) if err.is_retryable() => {
                    attempt += 1;
                    let reason = err.to_string();
                    if attempt >= self.config.max_attempts {
                        tracing::warn!(
                            attempts = attempt,
                            reason = %reason,
                            "publish retries exhausted, handing back as retryable"
                        );
                        return PublishOutcome::Retryable { reason };
                    }
                    let mut delay = policy.delay_for(attempt);
                    if let ApiFailure::RateLimited {
                        retry_after_secs: Some(hint),
                    } = &err
                    {
                        delay = delay.max(Duration::from_secs(*hint));
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient publish failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return PublishOutcome::Fatal {
                        reason: err.to_string(),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DisclosureVariant;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn candidate() -> PostCandidate {
        PostCandidate {
            topic: "vitamin c serum".to_string(),
            title: "Vitamin C Serum".to_string(),
            caption: "caption".to_string(),
            image_url: "https://img.example/x.png".to_string(),
            affiliate_link: "https://www.amazon.com/s?k=serum&tag=t".to_string(),
            disclosure: DisclosureVariant::Standard,
            hashtags: vec!["#A1".to_string(), "#B2".to_string(), "#C3".to_string()],
            alt_text: "photo".to_string(),
        }
    }

    /// Scripted API: pops the next failure, succeeds once the script is empty.
    struct ScriptedApi {
        script: Mutex<Vec<ApiFailure>>,
        calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(script: Vec<ApiFailure>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PublishingApi for ScriptedApi {
        async fn create_post(&self, _candidate: &PostCandidate) -> Result<String, ApiFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                Ok("pin-123".to_string())
            } else {
                Err(script.remove(0))
            }
        }
    }

    struct CountingRefresher {
        calls: AtomicU32,
        succeed: bool,
    }

    #[async_trait]
    impl AuthRefresher for CountingRefresher {
        async fn refresh(&self) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err("refresh endpoint rejected".to_string())
            }
        }
    }

    fn fast_config() -> PublisherConfig {
        PublisherConfig::new()
            .with_max_attempts(3)
            .with_backoff_base_ms(0)
            .with_rate_limit_rpm(10_000)
    }

    fn server_error() -> ApiFailure {
        ApiFailure::from_status(503, "unavailable".to_string(), None)
    }

    #[tokio::test]
    async fn test_publish_succeeds_first_try() {
        let api = ScriptedApi::new(vec![]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                post_id: "pin-123".to_string()
            }
        );
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_succeed() {
        let api = ScriptedApi::new(vec![server_error(), server_error()]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_retryable_not_enqueue() {
        let api = ScriptedApi::new(vec![server_error(), server_error(), server_error()]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Retryable { .. }));
        assert_eq!(api.calls(), 3, "bounded at max_attempts");
    }

    #[tokio::test]
    async fn test_validation_failure_is_fatal_without_retry() {
        let api = ScriptedApi::new(vec![ApiFailure::from_status(
            400,
            "bad image url".to_string(),
            None,
        )]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Fatal { .. }));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresher_is_fatal() {
        let api = ScriptedApi::new(vec![ApiFailure::from_status(
            401,
            "token expired".to_string(),
            None,
        )]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Fatal { .. }));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_retries() {
        let api = ScriptedApi::new(vec![ApiFailure::from_status(
            401,
            "token expired".to_string(),
            None,
        )]);
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            succeed: true,
        });
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config())
            .with_auth_refresher(Arc::clone(&refresher) as Arc<dyn AuthRefresher>);

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        assert_eq!(api.calls(), 2, "one failed call plus one post-refresh retry");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_after_refresh_is_fatal() {
        let api = ScriptedApi::new(vec![
            ApiFailure::from_status(401, "token expired".to_string(), None),
            ApiFailure::from_status(401, "still expired".to_string(), None),
        ]);
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            succeed: true,
        });
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config())
            .with_auth_refresher(Arc::clone(&refresher) as Arc<dyn AuthRefresher>);

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Fatal { .. }));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1, "refresh happens once");
    }

    #[tokio::test]
    async fn test_failed_refresh_is_fatal() {
        let api = ScriptedApi::new(vec![ApiFailure::from_status(
            401,
            "token expired".to_string(),
            None,
        )]);
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            succeed: false,
        });
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config())
            .with_auth_refresher(Arc::clone(&refresher) as Arc<dyn AuthRefresher>);

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Fatal { .. }));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_hint_does_not_break_retry() {
        let api = ScriptedApi::new(vec![ApiFailure::RateLimited {
            retry_after_secs: Some(0),
        }]);
        let publisher = Publisher::new(Arc::clone(&api) as Arc<dyn PublishingApi>, fast_config());

        let outcome = publisher.publish(&candidate()).await;
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        assert_eq!(api.calls(), 2);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiFailure::from_status(401, String::new(), None),
            ApiFailure::Unauthorized { .. }
        ));
        assert!(matches!(
            ApiFailure::from_status(429, String::new(), Some(30)),
            ApiFailure::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
        assert!(matches!(
            ApiFailure::from_status(400, String::new(), None),
            ApiFailure::Validation { status: 400, .. }
        ));
        assert!(matches!(
            ApiFailure::from_status(503, String::new(), None),
            ApiFailure::Server { status: 503, .. }
        ));
    }
}
