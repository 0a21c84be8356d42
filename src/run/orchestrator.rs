//! The per-run state machine.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::alert::{AlertChannel, Severity};
use crate::budget::{BudgetError, BudgetLedger, Period, ReserveOutcome};
use crate::content::ContentPipeline;
use crate::publish::{Publisher, PublishOutcome};
use crate::queue::{FallbackQueue, QueueError};
use crate::trends::{Trend, TrendError, TrendFilter, TrendSource};

/// Configuration for a single orchestrated run.
#[derive(Debug, Clone, serde::Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum posts attempted per run; remaining candidates are reported
    /// as not attempted, not as failures.
    pub post_limit: usize,
    /// Queue entries attempted per drain cycle.
    pub drain_batch_size: usize,
    /// Candidate processing halts once more than this many fatal failures
    /// occur in a row, and a shutdown condition is signalled to the caller.
    pub max_consecutive_fatal: u32,
    /// Whether a drain cycle runs at the end of every execution. The queue
    /// can also be drained on its own cadence via [`RunOrchestrator::drain`].
    pub drain_after_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            post_limit: 5,
            drain_batch_size: 10,
            max_consecutive_fatal: 3,
            drain_after_run: true,
        }
    }
}

impl RunConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-run post limit.
    pub fn with_post_limit(mut self, limit: usize) -> Self {
        self.post_limit = limit;
        self
    }

    /// Set the drain batch size.
    pub fn with_drain_batch_size(mut self, size: usize) -> Self {
        self.drain_batch_size = size;
        self
    }

    /// Set the consecutive fatal-failure threshold.
    pub fn with_max_consecutive_fatal(mut self, threshold: u32) -> Self {
        self.max_consecutive_fatal = threshold;
        self
    }

    /// Enable or disable the end-of-run drain cycle.
    pub fn with_drain_after_run(mut self, drain: bool) -> Self {
        self.drain_after_run = drain;
        self
    }
}

/// Errors that abort an entire run.
///
/// Everything else (compliance, budget rejection, transient and fatal
/// publish failures) is contained per candidate and reported in the
/// [`RunResult`].
#[derive(Error, Debug)]
pub enum RunError {
    /// Discovery unreachable: nothing to post, no partial run attempted.
    #[error("trend discovery failed: {0}")]
    Discovery(#[from] TrendError),

    /// Ledger store failure: spend guarantees cannot be trusted.
    #[error(transparent)]
    Budget(#[from] BudgetError),

    /// Queue store failure: dedup guarantees cannot be trusted.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Per-run report, produced once per orchestrator invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    /// Candidates that entered per-candidate processing.
    pub attempted: usize,
    /// Posts live on the platform.
    pub succeeded: usize,
    /// Posts parked in the fallback queue for a later drain.
    pub queued: usize,
    /// Candidates that terminally failed before reaching the queue
    /// (compliance, budget rejection, generation failure).
    pub failed_fatal: usize,
    /// Candidates never processed (post limit reached or run halted).
    pub not_attempted: usize,
    /// Spend incurred this run (reservations that stood).
    pub total_spend: Decimal,
    /// Queue entries delivered during this run's drain phase.
    pub drained: usize,
    /// Set when the consecutive-fatal threshold tripped; the caller's
    /// alerting collaborator decides whether future runs are halted.
    pub shutdown_signaled: bool,
}

/// Report from a queue-only drain cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
}

/// How one candidate left the pipeline; drives the fatal-failure counter.
enum CandidateOutcome {
    Succeeded,
    Queued,
    /// Budget rejection: run continues, counter untouched.
    BudgetSkipped,
    /// Terminal failure without queueing.
    FailedFatal,
    /// Publish-side fatal failure; queued so the generated content keeps a
    /// path to eventual publish, but counted against the fatal threshold.
    PublishFatal,
}

/// Drives one execution of the posting pipeline.
pub struct RunOrchestrator {
    trends: Arc<dyn TrendSource>,
    filter: TrendFilter,
    pipeline: ContentPipeline,
    publisher: Publisher,
    ledger: BudgetLedger,
    queue: FallbackQueue,
    alerts: Arc<dyn AlertChannel>,
    config: RunConfig,
}

impl RunOrchestrator {
    /// Assemble an orchestrator from its collaborators. All dependencies
    /// are explicit; the orchestrator holds no hidden statics.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trends: Arc<dyn TrendSource>,
        filter: TrendFilter,
        pipeline: ContentPipeline,
        publisher: Publisher,
        ledger: BudgetLedger,
        queue: FallbackQueue,
        alerts: Arc<dyn AlertChannel>,
        config: RunConfig,
    ) -> Self {
        Self {
            trends,
            filter,
            pipeline,
            publisher,
            ledger,
            queue,
            alerts,
            config,
        }
    }

    /// Execute one full run: fetch, filter, process candidates up to the
    /// post limit, then drain a batch of the fallback queue.
    pub async fn execute(&self) -> Result<RunResult, RunError> {
        let mut result = RunResult::default();

        // Stale budget periods are rolled over explicitly at run start;
        // reads never reset.
        self.ledger.roll_over(Utc::now())?;

        tracing::info!("fetching trends");
        let keywords: Vec<String> = self
            .pipeline
            .config()
            .niches
            .iter()
            .flat_map(|niche| niche.keywords.iter().cloned())
            .collect();
        let raw = self.trends.fetch(&keywords).await?;

        let selected = self.filter.select(raw, &self.pipeline.config().niches);
        if selected.is_empty() {
            // A quiet feed is a successful no-op, not an error.
            tracing::info!("no candidates after filtering, nothing to post");
            if self.config.drain_after_run {
                let drain = self.drain().await?;
                result.drained = drain.delivered;
            }
            return Ok(result);
        }

        let within_limit = selected.len().min(self.config.post_limit);
        result.not_attempted = selected.len() - within_limit;

        let mut consecutive_fatal = 0u32;
        for (index, trend) in selected.iter().take(within_limit).enumerate() {
            tracing::info!(topic = %trend.topic, "processing candidate");
            result.attempted += 1;

            match self.process_candidate(trend, &mut result).await? {
                CandidateOutcome::Succeeded | CandidateOutcome::Queued => {
                    consecutive_fatal = 0;
                }
                CandidateOutcome::BudgetSkipped => {}
                CandidateOutcome::FailedFatal | CandidateOutcome::PublishFatal => {
                    consecutive_fatal += 1;
                }
            }

            if consecutive_fatal > self.config.max_consecutive_fatal {
                result.shutdown_signaled = true;
                result.not_attempted += within_limit - index - 1;
                self.alerts
                    .notify(
                        &format!(
                            "halting run after {consecutive_fatal} consecutive fatal failures"
                        ),
                        Severity::Critical,
                    )
                    .await;
                tracing::error!(
                    consecutive_fatal,
                    threshold = self.config.max_consecutive_fatal,
                    "consecutive fatal-failure threshold exceeded, halting run"
                );
                break;
            }
        }

        if self.config.drain_after_run {
            let drain = self.drain().await?;
            result.drained = drain.delivered;
        }

        tracing::info!(
            attempted = result.attempted,
            succeeded = result.succeeded,
            queued = result.queued,
            failed_fatal = result.failed_fatal,
            not_attempted = result.not_attempted,
            total_spend = %result.total_spend,
            "run complete"
        );
        Ok(result)
    }

    /// Attempt redelivery for a bounded batch of parked posts.
    ///
    /// Delivered entries are acknowledged and removed; failures stay in
    /// place (with their attempt count bumped) for the next cycle, or move
    /// to the dead state once past the queue's ceiling.
    pub async fn drain(&self) -> Result<DrainReport, RunError> {
        let batch = self.queue.dequeue_batch(self.config.drain_batch_size)?;
        let mut report = DrainReport {
            attempted: batch.len(),
            ..DrainReport::default()
        };
        if batch.is_empty() {
            report.remaining = self.queue.size()?;
            return Ok(report);
        }

        tracing::info!(batch = batch.len(), "draining fallback queue");
        for entry in batch {
            match self.publisher.publish(&entry.candidate).await {
                PublishOutcome::Published { post_id } => {
                    self.queue.ack(&entry.id)?;
                    report.delivered += 1;
                    tracing::info!(
                        id = %entry.id,
                        post_id = %post_id,
                        "parked post delivered"
                    );
                }
                PublishOutcome::Retryable { reason } | PublishOutcome::Fatal { reason } => {
                    self.queue.enqueue(&entry.candidate, &reason)?;
                }
            }
        }

        report.remaining = self.queue.size()?;
        Ok(report)
    }

    async fn process_candidate(
        &self,
        trend: &Trend,
        result: &mut RunResult,
    ) -> Result<CandidateOutcome, RunError> {
        let prepared = match self.pipeline.prepare(trend) {
            Ok(prepared) => prepared,
            Err(violation) => {
                tracing::warn!(topic = %trend.topic, %violation, "candidate rejected by compliance");
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::FailedFatal);
            }
        };

        // Reserve-before-call: the image charge is committed before the
        // paid call and compensated if the call fails.
        let image_cost = self.pipeline.image_cost();
        let image_reservation = match self.ledger.reserve(image_cost, Period::Day)? {
            ReserveOutcome::Reserved(reservation) => reservation,
            ReserveOutcome::Rejected { spent, cap } => {
                self.alerts
                    .notify(
                        &format!("daily image budget exhausted ({spent} of {cap})"),
                        Severity::Warning,
                    )
                    .await;
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::BudgetSkipped);
            }
        };
        let image = match self.pipeline.generate_image(&prepared.image_request).await {
            Ok(image) => {
                result.total_spend += image_cost;
                image
            }
            Err(err) => {
                self.ledger.release(&image_reservation)?;
                tracing::error!(topic = %trend.topic, error = %err, "image generation failed, reservation released");
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::FailedFatal);
            }
        };

        let text_cost = self.pipeline.text_cost();
        let text_reservation = match self.ledger.reserve(text_cost, Period::Month)? {
            ReserveOutcome::Reserved(reservation) => reservation,
            ReserveOutcome::Rejected { spent, cap } => {
                // The image call completed, so its charge stands.
                self.alerts
                    .notify(
                        &format!("monthly text budget exhausted ({spent} of {cap})"),
                        Severity::Warning,
                    )
                    .await;
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::BudgetSkipped);
            }
        };
        let caption = match self
            .pipeline
            .generate_caption(&prepared.caption_request)
            .await
        {
            Ok(caption) => {
                result.total_spend += text_cost;
                caption
            }
            Err(err) => {
                self.ledger.release(&text_reservation)?;
                tracing::error!(topic = %trend.topic, error = %err, "caption generation failed, reservation released");
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::FailedFatal);
            }
        };

        let candidate = match self.pipeline.assemble(trend, &prepared, image, &caption) {
            Ok(candidate) => candidate,
            Err(violation) => {
                tracing::warn!(topic = %trend.topic, %violation, "assembled post rejected by compliance");
                result.failed_fatal += 1;
                return Ok(CandidateOutcome::FailedFatal);
            }
        };

        match self.publisher.publish(&candidate).await {
            PublishOutcome::Published { .. } => {
                result.succeeded += 1;
                Ok(CandidateOutcome::Succeeded)
            }
            PublishOutcome::Retryable { reason } => {
                // Generation cost is already incurred; the reservation
                // stands and the post keeps a path to eventual publish.
                self.queue.enqueue(&candidate, &reason)?;
                result.queued += 1;
                Ok(CandidateOutcome::Queued)
            }
            PublishOutcome::Fatal { reason } => {
                self.queue.enqueue(&candidate, &reason)?;
                result.queued += 1;
                tracing::error!(topic = %trend.topic, reason = %reason, "fatal publish failure, post parked for intervention");
                Ok(CandidateOutcome::PublishFatal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetConfig;
    use crate::content::{
        AffiliateLinkFormatter, BackendError, CaptionRequest, ContentConfig, ImageBackend,
        ImageRef, ImageRequest, NicheConfig, TextBackend,
    };
    use crate::publish::{ApiFailure, PublisherConfig, PublishingApi};
    use crate::queue::QueueConfig;
    use crate::trends::RawTrend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    struct StaticTrends {
        topics: Vec<(&'static str, u64)>,
    }

    #[async_trait]
    impl TrendSource for StaticTrends {
        async fn fetch(&self, _keywords: &[String]) -> Result<Vec<RawTrend>, TrendError> {
            Ok(self
                .topics
                .iter()
                .map(|(topic, popularity)| RawTrend {
                    topic: (*topic).to_string(),
                    popularity: *popularity,
                })
                .collect())
        }
    }

    struct DownTrends;

    #[async_trait]
    impl TrendSource for DownTrends {
        async fn fetch(&self, _keywords: &[String]) -> Result<Vec<RawTrend>, TrendError> {
            Err(TrendError::Unavailable("connection refused".to_string()))
        }
    }

    struct StubImage {
        cost: Decimal,
        fail: bool,
    }

    #[async_trait]
    impl ImageBackend for StubImage {
        async fn generate(&self, _request: &ImageRequest) -> Result<ImageRef, BackendError> {
            if self.fail {
                Err(BackendError::Api("image backend rejected".to_string()))
            } else {
                Ok(ImageRef {
                    url: "https://img.example/generated.png".to_string(),
                })
            }
        }

        fn cost(&self) -> Decimal {
            self.cost
        }
    }

    struct StubText {
        cost: Decimal,
    }

    #[async_trait]
    impl TextBackend for StubText {
        async fn generate(&self, request: &CaptionRequest) -> Result<String, BackendError> {
            let mut body = "Glow brighter every single morning with this simple routine \
                            upgrade you can start tonight ✨"
                .to_string();
            while body.chars().count() < request.target_min {
                body.push_str(" Glow on.");
            }
            Ok(body)
        }

        fn cost(&self) -> Decimal {
            self.cost
        }
    }

    struct StubAffiliate;

    impl AffiliateLinkFormatter for StubAffiliate {
        fn format(&self, topic: &str, niche: &NicheConfig) -> String {
            format!(
                "https://www.amazon.com/s?k={}+{}&tag=test-20",
                topic.replace(' ', "+"),
                niche.search_terms
            )
        }
    }

    /// Publishing stub: fails `failures` times with the scripted failure,
    /// then succeeds.
    struct FlakyApi {
        failures: AtomicU32,
        status: u16,
        calls: AtomicU32,
    }

    impl FlakyApi {
        fn ok() -> Arc<Self> {
            Self::failing(0, 200)
        }

        fn failing(failures: u32, status: u16) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                status,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PublishingApi for FlakyApi {
        async fn create_post(
            &self,
            _candidate: &crate::content::PostCandidate,
        ) -> Result<String, ApiFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                Err(ApiFailure::from_status(
                    self.status,
                    "scripted failure".to_string(),
                    None,
                ))
            } else {
                Ok(format!("pin-{}", self.calls.load(Ordering::SeqCst)))
            }
        }
    }

    #[derive(Default)]
    struct CollectingAlerts {
        messages: Mutex<Vec<(String, Severity)>>,
    }

    #[async_trait]
    impl AlertChannel for CollectingAlerts {
        async fn notify(&self, message: &str, severity: Severity) {
            self.messages
                .lock()
                .expect("alerts lock")
                .push((message.to_string(), severity));
        }
    }

    struct Harness {
        orchestrator: RunOrchestrator,
        ledger: BudgetLedger,
        queue: FallbackQueue,
        alerts: Arc<CollectingAlerts>,
        _dir: TempDir,
    }

    fn harness(
        trends: Arc<dyn TrendSource>,
        api: Arc<dyn PublishingApi>,
        budget: BudgetConfig,
        run: RunConfig,
        image_fails: bool,
    ) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let ledger = BudgetLedger::new(dir.path(), budget.clone());
        let queue = FallbackQueue::new(dir.path(), QueueConfig::default());
        let alerts = Arc::new(CollectingAlerts::default());
        let pipeline = ContentPipeline::new(
            ContentConfig::default(),
            Arc::new(StubImage {
                cost: budget.image_cost,
                fail: image_fails,
            }),
            Arc::new(StubText {
                cost: budget.text_cost_for(150),
            }),
            Arc::new(StubAffiliate),
        );
        let publisher = Publisher::new(
            api,
            PublisherConfig::new()
                .with_max_attempts(3)
                .with_backoff_base_ms(0)
                .with_rate_limit_rpm(10_000),
        );
        let orchestrator = RunOrchestrator::new(
            trends,
            TrendFilter::default(),
            pipeline,
            publisher,
            ledger.clone(),
            queue.clone(),
            Arc::clone(&alerts) as Arc<dyn AlertChannel>,
            run,
        );
        Harness {
            orchestrator,
            ledger,
            queue,
            alerts,
            _dir: dir,
        }
    }

    fn eight_serum_trends() -> Arc<StaticTrends> {
        Arc::new(StaticTrends {
            topics: vec![
                ("vitamin c serum", 900),
                ("retinol serum", 850),
                ("hyaluronic serum", 800),
                ("niacinamide serum", 750),
                ("peptide serum", 700),
                ("glow serum", 650),
                ("night serum", 600),
                ("eye serum", 550),
            ],
        })
    }

    #[tokio::test]
    async fn test_post_limit_caps_attempts_and_reports_rest() {
        let h = harness(
            eight_serum_trends(),
            FlakyApi::ok(),
            BudgetConfig::default(),
            RunConfig::new().with_post_limit(5),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.attempted, 5);
        assert_eq!(result.succeeded, 5);
        assert_eq!(result.not_attempted, 3);
        assert_eq!(result.failed_fatal, 0);
    }

    #[tokio::test]
    async fn test_empty_filter_result_is_successful_noop() {
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("garden furniture", 1000)],
            }),
            FlakyApi::ok(),
            BudgetConfig::default(),
            RunConfig::new(),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.attempted, 0);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed_fatal, 0);
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts_run() {
        let h = harness(
            Arc::new(DownTrends),
            FlakyApi::ok(),
            BudgetConfig::default(),
            RunConfig::new(),
            false,
        );

        let result = h.orchestrator.execute().await;
        assert!(matches!(result, Err(RunError::Discovery(_))));
    }

    #[tokio::test]
    async fn test_retryable_publish_parks_one_entry_and_keeps_spend() {
        let api = FlakyApi::failing(10, 503);
        let budget = BudgetConfig::default();
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("vitamin c serum", 900)],
            }),
            Arc::clone(&api) as Arc<dyn PublishingApi>,
            budget.clone(),
            RunConfig::new().with_post_limit(1).with_drain_after_run(false),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.queued, 1);
        assert_eq!(result.succeeded, 0);

        // Exactly one entry, attempt count 1 (the run parks it once).
        let entries = h.queue.entries().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);

        // Publish failure does not touch the generation spend.
        let expected = budget.image_cost;
        assert_eq!(h.ledger.spent(Period::Day).expect("spent"), expected);
        assert_eq!(
            h.ledger.spent(Period::Month).expect("spent"),
            budget.text_cost_for(150)
        );
    }

    #[tokio::test]
    async fn test_budget_rejection_skips_without_queueing() {
        // Cap allows exactly one image.
        let budget = BudgetConfig::default().with_daily_image_cap(dec("0.04"));
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("vitamin c serum", 900), ("retinol serum", 800)],
            }),
            FlakyApi::ok(),
            budget,
            RunConfig::new().with_post_limit(2),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.attempted, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed_fatal, 1);
        assert_eq!(result.queued, 0);
        assert_eq!(h.queue.size().expect("size"), 0, "budget skips are not queued");

        let alerts = h.alerts.messages.lock().expect("alerts lock");
        assert!(alerts
            .iter()
            .any(|(m, s)| m.contains("daily image budget") && *s == Severity::Warning));
    }

    #[tokio::test]
    async fn test_generation_failure_releases_reservation() {
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("vitamin c serum", 900)],
            }),
            FlakyApi::ok(),
            BudgetConfig::default(),
            RunConfig::new().with_post_limit(1),
            true,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.failed_fatal, 1);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.total_spend, Decimal::ZERO);
        assert_eq!(
            h.ledger.spent(Period::Day).expect("spent"),
            Decimal::ZERO,
            "failed call's reservation must be released"
        );
    }

    #[tokio::test]
    async fn test_consecutive_fatal_threshold_halts_and_signals() {
        // Every publish is a 400: fatal, queued, and counted against the
        // threshold of 1, so the run halts after the second candidate.
        let h = harness(
            eight_serum_trends(),
            FlakyApi::failing(u32::MAX, 400),
            BudgetConfig::default().with_daily_image_cap(dec("1.00")),
            RunConfig::new()
                .with_post_limit(5)
                .with_max_consecutive_fatal(1),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert!(result.shutdown_signaled);
        assert_eq!(result.attempted, 2);
        assert_eq!(result.not_attempted, 3 + 3);

        let alerts = h.alerts.messages.lock().expect("alerts lock");
        assert!(alerts
            .iter()
            .any(|(m, s)| m.contains("consecutive fatal") && *s == Severity::Critical));
    }

    #[tokio::test]
    async fn test_drain_delivers_and_acks() {
        let api = FlakyApi::failing(3, 503);
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("vitamin c serum", 900)],
            }),
            Arc::clone(&api) as Arc<dyn PublishingApi>,
            BudgetConfig::default(),
            RunConfig::new().with_post_limit(1).with_drain_after_run(false),
            false,
        );

        // First run exhausts the publisher's 3 attempts and parks the post.
        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.queued, 1);
        assert_eq!(h.queue.size().expect("size"), 1);

        // The scripted failures are spent; a drain cycle delivers and acks.
        let report = h.orchestrator.drain().await.expect("drain");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(h.queue.size().expect("size"), 0);
    }

    #[tokio::test]
    async fn test_drain_failure_bumps_attempts_in_place() {
        let api = FlakyApi::failing(u32::MAX, 503);
        let h = harness(
            Arc::new(StaticTrends {
                topics: vec![("vitamin c serum", 900)],
            }),
            Arc::clone(&api) as Arc<dyn PublishingApi>,
            BudgetConfig::default(),
            RunConfig::new().with_post_limit(1).with_drain_after_run(false),
            false,
        );

        let result = h.orchestrator.execute().await.expect("run");
        assert_eq!(result.queued, 1);

        h.orchestrator.drain().await.expect("drain");
        h.orchestrator.drain().await.expect("drain");
        let entries = h.queue.entries().expect("entries");
        assert_eq!(entries.len(), 1, "no duplicate entry from failed drains");
        assert_eq!(entries[0].attempts, 3);
    }
}
