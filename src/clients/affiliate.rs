//! Affiliate link construction.

use crate::content::{AffiliateLinkFormatter, NicheConfig};

/// Builds Amazon search links carrying the associate tag.
///
/// Pure string work: the topic is combined with the niche's search-term
/// expansion so the link lands on a relevant product search.
#[derive(Debug, Clone)]
pub struct AmazonLinkFormatter {
    associate_tag: String,
}

impl AmazonLinkFormatter {
    /// Create a formatter for the given associate tag.
    pub fn new(associate_tag: impl Into<String>) -> Self {
        Self {
            associate_tag: associate_tag.into(),
        }
    }
}

impl AffiliateLinkFormatter for AmazonLinkFormatter {
    fn format(&self, topic: &str, niche: &NicheConfig) -> String {
        let base_term = topic.trim().replace(' ', "+");
        format!(
            "https://www.amazon.com/s?k={}+{}&tag={}",
            base_term, niche.search_terms, self.associate_tag
        )
    }
}
