//! Content compliance rules.
//!
//! Every assembled post is checked against the configured rules before it
//! can be published. A violation rejects the post outright with the
//! offending rule named; posts are never silently truncated or fixed up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pipeline::PostCandidate;

/// Which pre-approved affiliate disclosure string is injected into posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureVariant {
    Minimal,
    Standard,
    Regulatory,
}

/// The pre-approved disclosure strings, one per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisclosureTexts {
    pub minimal: String,
    pub standard: String,
    pub regulatory: String,
}

impl Default for DisclosureTexts {
    fn default() -> Self {
        Self {
            minimal: "#ad".to_string(),
            standard: "This post contains affiliate links.".to_string(),
            regulatory: "As an Amazon Associate I earn from qualifying purchases."
                .to_string(),
        }
    }
}

impl DisclosureTexts {
    /// Text for the given variant.
    pub fn text(&self, variant: DisclosureVariant) -> &str {
        match variant {
            DisclosureVariant::Minimal => &self.minimal,
            DisclosureVariant::Standard => &self.standard,
            DisclosureVariant::Regulatory => &self.regulatory,
        }
    }
}

/// A named content rule violation. The post is rejected as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComplianceViolation {
    #[error("no configured niche matches topic '{topic}'")]
    NoNicheMatch { topic: String },

    #[error("caption length {length} outside allowed {min}..={max}")]
    CaptionLength {
        length: usize,
        min: usize,
        max: usize,
    },

    #[error("caption must contain exactly one disclosure, found {count}")]
    DisclosureCount { count: usize },

    #[error("hashtag count {count} outside allowed {min}..={max}")]
    HashtagCount {
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("malformed hashtag '{tag}'")]
    MalformedHashtag { tag: String },

    #[error("prohibited claim phrase '{phrase}'")]
    ProhibitedPhrase { phrase: String },
}

/// Configuration for the compliance gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub disclosure_variant: DisclosureVariant,
    pub disclosures: DisclosureTexts,
    /// Case-insensitive substrings that disqualify a post.
    pub banned_phrases: Vec<String>,
    /// Final caption length bounds, in characters, disclosure included.
    pub caption_min: usize,
    pub caption_max: usize,
    pub hashtag_min: usize,
    pub hashtag_max: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            disclosure_variant: DisclosureVariant::Standard,
            disclosures: DisclosureTexts::default(),
            banned_phrases: [
                "miracle cure",
                "clinically proven",
                "guaranteed results",
                "reverses aging",
                "fda approved",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            caption_min: 180,
            caption_max: 220,
            hashtag_min: 3,
            hashtag_max: 5,
        }
    }
}

impl ComplianceConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the disclosure variant.
    pub fn with_disclosure_variant(mut self, variant: DisclosureVariant) -> Self {
        self.disclosure_variant = variant;
        self
    }

    /// Set the caption length bounds.
    pub fn with_caption_bounds(mut self, min: usize, max: usize) -> Self {
        self.caption_min = min;
        self.caption_max = max;
        self
    }

    /// Set the banned phrase list.
    pub fn with_banned_phrases(mut self, phrases: Vec<String>) -> Self {
        self.banned_phrases = phrases;
        self
    }

    /// The active disclosure string.
    pub fn disclosure_text(&self) -> &str {
        self.disclosures.text(self.disclosure_variant)
    }

    /// Check an assembled candidate against every rule.
    ///
    /// Returns the first violation found; the candidate is never patched.
    pub fn check(&self, candidate: &PostCandidate) -> Result<(), ComplianceViolation> {
        let length = candidate.caption.chars().count();
        if length < self.caption_min || length > self.caption_max {
            return Err(ComplianceViolation::CaptionLength {
                length,
                min: self.caption_min,
                max: self.caption_max,
            });
        }

        let disclosure = self.disclosure_text();
        let count = candidate.caption.matches(disclosure).count();
        if count != 1 {
            return Err(ComplianceViolation::DisclosureCount { count });
        }

        let tags = candidate.hashtags.len();
        if tags < self.hashtag_min || tags > self.hashtag_max {
            return Err(ComplianceViolation::HashtagCount {
                count: tags,
                min: self.hashtag_min,
                max: self.hashtag_max,
            });
        }
        for tag in &candidate.hashtags {
            let mut chars = tag.chars();
            let well_formed = chars.next() == Some('#')
                && tag.len() > 1
                && chars.all(|c| c.is_alphanumeric() || c == '_');
            if !well_formed {
                return Err(ComplianceViolation::MalformedHashtag { tag: tag.clone() });
            }
        }

        let haystack = format!("{} {}", candidate.title, candidate.caption).to_lowercase();
        for phrase in &self.banned_phrases {
            if haystack.contains(phrase.to_lowercase().as_str()) {
                return Err(ComplianceViolation::ProhibitedPhrase {
                    phrase: phrase.clone(),
                });
            }
        }

        Ok(())
    }
}
