//! Trend discovery model and filtering.
//!
//! Discovery is an external collaborator behind [`TrendSource`]; this module
//! owns the ephemeral [`Trend`] model and the keyword filter that turns a
//! raw trending feed into ranked, niche-matched candidates for a run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::NicheConfig;

/// Error from the trend discovery collaborator.
///
/// Discovery failure aborts the whole run; there is nothing to post without
/// candidates, so no partial posting is attempted.
#[derive(Error, Debug)]
pub enum TrendError {
    #[error("trend source unavailable: {0}")]
    Unavailable(String),
}

/// A raw trending topic as returned by the discovery source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrend {
    pub topic: String,
    pub popularity: u64,
}

/// A niche-matched trend, ready for content generation.
///
/// Ephemeral: produced by the filter, consumed within the run, discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub topic: String,
    pub matched_keywords: Vec<String>,
    pub popularity: u64,
    pub discovered_at: DateTime<Utc>,
}

/// Source of trending topics.
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Fetch raw trending topics, scoped by the configured niche keywords.
    async fn fetch(&self, niche_keywords: &[String]) -> Result<Vec<RawTrend>, TrendError>;
}

/// Keyword filter over the raw trending feed.
///
/// A trend survives only if it matches at least one niche keyword set and
/// contains no blacklisted bargain/DIY term. Survivors are sorted by
/// descending popularity and capped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilter {
    /// Terms that disqualify a topic outright.
    pub blacklist: Vec<String>,
    /// Maximum trends handed to the run.
    pub max_trends: usize,
}

impl Default for TrendFilter {
    fn default() -> Self {
        Self {
            blacklist: [
                "sale", "discount", "free", "cheap", "tutorial", "how to", "diy",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_trends: 10,
        }
    }
}

impl TrendFilter {
    /// Create a filter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trend cap.
    pub fn with_max_trends(mut self, max: usize) -> Self {
        self.max_trends = max;
        self
    }

    /// Set the blacklist.
    pub fn with_blacklist(mut self, blacklist: Vec<String>) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Filter, match and rank a raw feed against the configured niches.
    pub fn select(&self, raw: Vec<RawTrend>, niches: &[NicheConfig]) -> Vec<Trend> {
        let now = Utc::now();
        let mut selected: Vec<Trend> = raw
            .into_iter()
            .filter_map(|entry| {
                let topic = entry.topic.trim().to_lowercase();
                if topic.is_empty() || self.is_blacklisted(&topic) {
                    return None;
                }
                let matched: Vec<String> = niches
                    .iter()
                    .flat_map(|niche| niche.matched_keywords(&topic))
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                Some(Trend {
                    topic,
                    matched_keywords: matched,
                    popularity: entry.popularity,
                    discovered_at: now,
                })
            })
            .collect();

        selected.sort_by(|a, b| b.popularity.cmp(&a.popularity));
        selected.truncate(self.max_trends);
        tracing::info!(count = selected.len(), "trends selected after filtering");
        selected
    }

    fn is_blacklisted(&self, topic: &str) -> bool {
        self.blacklist
            .iter()
            .any(|term| topic.contains(term.as_str()))
    }
}
