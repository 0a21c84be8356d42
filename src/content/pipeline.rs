//! Trend-to-post transformation.
//!
//! `prepare` (pure) templates the image and caption requests from the
//! matched niche, `generate_*` (the only suspend points) call the priced
//! backends with bounded retry, and `assemble` (pure) builds the final
//! candidate and runs the compliance gate once on the finished content.
//! The staged shape lets the orchestrator interleave budget reservations
//! with the calls they guard without re-running checks on unchanged input.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::trends::Trend;

use super::compliance::{ComplianceConfig, ComplianceViolation, DisclosureVariant};
use super::niche::{default_niches, subniche_style, NicheConfig, VisualStyle};

/// Length of the hex identity prefix used to key queue entries.
const IDENTITY_LEN: usize = 16;

/// Failure from a generation backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend asked us to back off.
    #[error("backend rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Application-level error from the backend; retrying won't fix it.
    #[error("backend error: {0}")]
    Api(String),

    /// The response body could not be interpreted.
    #[error("malformed backend response: {0}")]
    Deserialize(String),

    /// Transient failure signalled by a non-HTTP backend (used by mocks).
    #[error("transient backend failure: {0}")]
    Transient(String),
}

impl BackendError {
    /// Whether the failure is worth retrying after a backoff delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            BackendError::RateLimited { .. } | BackendError::Transient(_) => true,
            BackendError::Api(_) | BackendError::Deserialize(_) => false,
        }
    }
}

/// Templated request for one generated image. Not a free-form prompt: the
/// text comes from a fixed template with interpolated niche attributes, and
/// resolution/style are pinned by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
}

impl ImageRequest {
    fn from_template(topic: &str, style: &VisualStyle, size: &str) -> Self {
        let prompt = format!(
            "Pinterest-optimized vertical product photograph of {topic}. \
             Color palette: {color}. Props: {props}. Lighting: {lighting}. \
             Style: {visual}. Camera: {angle}. \
             Leave negative space for a text overlay and avoid visible AI artifacts.",
            topic = topic,
            color = style.color,
            props = style.props,
            lighting = style.lighting,
            visual = style.style,
            angle = style.angle,
        );
        Self {
            prompt,
            size: size.to_string(),
        }
    }
}

/// Templated caption request with a fixed character target and token budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRequest {
    pub prompt: String,
    /// Character bounds the generated body should land in (disclosure
    /// excluded; it is appended afterwards and must never be truncated).
    pub target_min: usize,
    pub target_max: usize,
    pub max_tokens: u32,
}

/// Reference to a generated image, as handed back by the image backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

/// Priced image generation collaborator.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageRef, BackendError>;

    /// Price of one call, charged against the daily budget.
    fn cost(&self) -> Decimal;
}

/// Priced caption generation collaborator.
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn generate(&self, request: &CaptionRequest) -> Result<String, BackendError>;

    /// Estimated price of one call, charged against the monthly budget.
    fn cost(&self) -> Decimal;
}

/// Pure affiliate link construction, outside the paid pipeline.
pub trait AffiliateLinkFormatter: Send + Sync {
    fn format(&self, topic: &str, niche: &NicheConfig) -> String;
}

/// A fully assembled post. Immutable after construction: it is either
/// published or parked in the fallback queue exactly as built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCandidate {
    pub topic: String,
    pub title: String,
    /// Final caption text, disclosure included.
    pub caption: String,
    pub image_url: String,
    pub affiliate_link: String,
    pub disclosure: DisclosureVariant,
    pub hashtags: Vec<String>,
    pub alt_text: String,
}

impl PostCandidate {
    /// Stable identity derived from the candidate's content.
    ///
    /// Two logically identical posts (same topic and affiliate link) share
    /// an identity, which is what keeps the fallback queue free of
    /// duplicates across repeated failures.
    pub fn stable_identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.topic.as_bytes());
        hasher.update(b"|");
        hasher.update(self.affiliate_link.as_bytes());
        let digest = hasher.finalize();
        hex::encode(digest)[..IDENTITY_LEN].to_string()
    }
}

/// Configuration for the content pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub niches: Vec<NicheConfig>,
    pub compliance: ComplianceConfig,
    /// Fixed target resolution for every image request.
    pub image_size: String,
    /// Token budget handed to the text backend per caption.
    pub caption_token_budget: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            niches: default_niches(),
            compliance: ComplianceConfig::default(),
            image_size: "1024x1024".to_string(),
            caption_token_budget: 150,
        }
    }
}

/// Error from a full pipeline build.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("compliance rejected: {0}")]
    Compliance(#[from] ComplianceViolation),

    #[error("image generation failed: {0}")]
    Image(#[source] BackendError),

    #[error("caption generation failed: {0}")]
    Text(#[source] BackendError),
}

/// Output of the pure preparation stage.
#[derive(Debug, Clone)]
pub struct PreparedPost {
    pub niche: NicheConfig,
    pub style: VisualStyle,
    pub image_request: ImageRequest,
    pub caption_request: CaptionRequest,
}

/// The trend-to-candidate transformation.
pub struct ContentPipeline {
    config: ContentConfig,
    image_backend: Arc<dyn ImageBackend>,
    text_backend: Arc<dyn TextBackend>,
    affiliate: Arc<dyn AffiliateLinkFormatter>,
    retry: RetryPolicy,
}

impl ContentPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        config: ContentConfig,
        image_backend: Arc<dyn ImageBackend>,
        text_backend: Arc<dyn TextBackend>,
        affiliate: Arc<dyn AffiliateLinkFormatter>,
    ) -> Self {
        Self {
            config,
            image_backend,
            text_backend,
            affiliate,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the backend retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &ContentConfig {
        &self.config
    }

    /// Price of one image generation call.
    pub fn image_cost(&self) -> Decimal {
        self.image_backend.cost()
    }

    /// Estimated price of one caption generation call.
    pub fn text_cost(&self) -> Decimal {
        self.text_backend.cost()
    }

    /// Pure stage: match the niche and template both generation requests.
    pub fn prepare(&self, trend: &Trend) -> Result<PreparedPost, ComplianceViolation> {
        let niche = self
            .match_niche(&trend.topic)
            .ok_or_else(|| ComplianceViolation::NoNicheMatch {
                topic: trend.topic.clone(),
            })?;
        let style = subniche_style(&trend.topic, niche);
        let image_request =
            ImageRequest::from_template(&trend.topic, &style, &self.config.image_size);

        let compliance = &self.config.compliance;
        let reserved = compliance.disclosure_text().chars().count() + 1;
        let target_min = compliance.caption_min.saturating_sub(reserved);
        let target_max = compliance.caption_max.saturating_sub(reserved);
        let caption_request = CaptionRequest {
            prompt: format!(
                "Write an engaging Pinterest caption about {topic} for the {niche} audience. \
                 Focus on benefits and results, keep a positive encouraging tone, include a \
                 couple of fitting emojis, and keep the text between {target_min} and \
                 {target_max} characters. Do not include hashtags or links.",
                topic = trend.topic,
                niche = niche.name,
            ),
            target_min,
            target_max,
            max_tokens: self.config.caption_token_budget,
        };

        Ok(PreparedPost {
            niche: niche.clone(),
            style,
            image_request,
            caption_request,
        })
    }

    /// Suspend point: generate the image, retrying transient failures.
    pub async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<ImageRef, BackendError> {
        retry_with_backoff(&self.retry, BackendError::is_retryable, || {
            self.image_backend.generate(request)
        })
        .await
    }

    /// Suspend point: generate the caption body, retrying transient failures.
    pub async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, BackendError> {
        retry_with_backoff(&self.retry, BackendError::is_retryable, || {
            self.text_backend.generate(request)
        })
        .await
    }

    /// Pure stage: assemble the candidate and run the compliance gate.
    ///
    /// The disclosure is appended deterministically after the generated
    /// body, so no later step can truncate it away.
    pub fn assemble(
        &self,
        trend: &Trend,
        prepared: &PreparedPost,
        image: ImageRef,
        caption_body: &str,
    ) -> Result<PostCandidate, ComplianceViolation> {
        let compliance = &self.config.compliance;
        let caption = format!(
            "{}\n{}",
            caption_body.trim(),
            compliance.disclosure_text()
        );
        let candidate = PostCandidate {
            topic: trend.topic.clone(),
            title: title_for(&trend.topic),
            caption,
            image_url: image.url,
            affiliate_link: self.affiliate.format(&trend.topic, &prepared.niche),
            disclosure: compliance.disclosure_variant,
            hashtags: build_hashtags(&prepared.niche, &trend.topic, compliance.hashtag_max),
            alt_text: format!(
                "{} photograph of {} in {}",
                prepared.style.style, trend.topic, prepared.style.color
            ),
        };
        compliance.check(&candidate)?;
        Ok(candidate)
    }

    /// Full transformation: prepare, generate both assets, assemble.
    ///
    /// Budget-aware callers drive the stages individually so each paid call
    /// is guarded by its own reservation; this composition serves the
    /// unguarded paths (dry runs, tests).
    pub async fn build(&self, trend: &Trend) -> Result<PostCandidate, PipelineError> {
        let prepared = self.prepare(trend)?;
        let image = self
            .generate_image(&prepared.image_request)
            .await
            .map_err(PipelineError::Image)?;
        let caption = self
            .generate_caption(&prepared.caption_request)
            .await
            .map_err(PipelineError::Text)?;
        Ok(self.assemble(trend, &prepared, image, &caption)?)
    }

    /// Deterministic template caption for operator use when the text
    /// backend is exhausted. Never substituted into a post automatically.
    pub fn fallback_caption(&self, trend: &Trend, niche: &NicheConfig) -> String {
        format!(
            "Discover the secret to a better {} routine with trending {} picks you can \
             shop right now. Simple steps, visible results, and a look you will want to \
             pin for later.",
            niche.name, trend.topic
        )
    }

    fn match_niche(&self, topic: &str) -> Option<&NicheConfig> {
        self.config
            .niches
            .iter()
            .find(|niche| !niche.matched_keywords(topic).is_empty())
    }
}

/// Title-case the topic, bounded to the platform's title limit.
fn title_for(topic: &str) -> String {
    let mut title = topic
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    title.truncate(100);
    title
}

/// Niche hashtag vocabulary plus a tag built from the topic itself.
fn build_hashtags(niche: &NicheConfig, topic: &str, max: usize) -> Vec<String> {
    let mut tags: Vec<String> = niche
        .hashtags
        .iter()
        .take(max.saturating_sub(1))
        .cloned()
        .collect();

    let topic_tag: String = topic
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars().filter(|c| c.is_alphanumeric());
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.collect::<String>()
                }
                None => String::new(),
            }
        })
        .collect();
    if topic_tag.len() > 1 {
        let tag = format!("#{topic_tag}");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    tags.truncate(max);
    tags
}
