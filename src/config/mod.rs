//! Application configuration.
//!
//! Configuration is loaded from an optional `glowpost.toml` plus `GLOWPOST_`
//! environment overrides, deserialized into typed per-module sections, and
//! validated once at startup. Missing or malformed entries fail fast here
//! rather than at first use inside a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::BudgetConfig;
use crate::content::ContentConfig;
use crate::publish::PublisherConfig;
use crate::queue::QueueConfig;
use crate::run::RunConfig;
use crate::trends::TrendFilter;

/// Configuration loading or validation failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub run: RunConfig,
    pub budget: BudgetConfig,
    pub queue: QueueConfig,
    pub content: ContentConfig,
    pub publisher: PublisherConfig,
    pub trends: TrendFilter,
    /// Directory holding the budget ledger and fallback queue stores.
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            budget: BudgetConfig::default(),
            queue: QueueConfig::default(),
            content: ContentConfig::default(),
            publisher: PublisherConfig::default(),
            trends: TrendFilter::default(),
            state_dir: PathBuf::from(".glowpost"),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given file (or `glowpost.toml` in the
    /// working directory when absent) plus environment overrides, then
    /// validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("glowpost").required(false)),
        };
        let app: AppConfig = builder
            .add_source(config::Environment::with_prefix("GLOWPOST").separator("__"))
            .build()?
            .try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Validate cross-field constraints. Called by [`AppConfig::load`];
    /// programmatically built configs should call it too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content.niches.is_empty() {
            return Err(ConfigError::Invalid(
                "content.niches must not be empty".to_string(),
            ));
        }
        for niche in &self.content.niches {
            if niche.name.trim().is_empty() {
                return Err(ConfigError::Invalid("niche name must not be empty".to_string()));
            }
            if niche.keywords.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "niche '{}' has no keywords",
                    niche.name
                )));
            }
            if niche.hashtags.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "niche '{}' has no hashtags",
                    niche.name
                )));
            }
        }

        let compliance = &self.content.compliance;
        if compliance.caption_min >= compliance.caption_max {
            return Err(ConfigError::Invalid(format!(
                "caption bounds inverted: {}..{}",
                compliance.caption_min, compliance.caption_max
            )));
        }
        let disclosure = compliance.disclosure_text();
        if disclosure.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "active disclosure text must not be empty".to_string(),
            ));
        }
        if disclosure.chars().count() + 1 >= compliance.caption_min {
            return Err(ConfigError::Invalid(
                "caption_min leaves no room for the disclosure".to_string(),
            ));
        }
        if compliance.hashtag_min == 0 || compliance.hashtag_min > compliance.hashtag_max {
            return Err(ConfigError::Invalid(format!(
                "hashtag bounds invalid: {}..{}",
                compliance.hashtag_min, compliance.hashtag_max
            )));
        }

        if self.budget.image_cost.is_sign_negative()
            || self.budget.text_cost_per_1k_tokens.is_sign_negative()
            || self.budget.daily_image_cap.is_sign_negative()
            || self.budget.monthly_text_cap.is_sign_negative()
        {
            return Err(ConfigError::Invalid(
                "budget amounts must not be negative".to_string(),
            ));
        }

        if self.publisher.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "publisher.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.publisher.rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid(
                "publisher.rate_limit_rpm must be at least 1".to_string(),
            ));
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "queue.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.run.drain_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "run.drain_batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
