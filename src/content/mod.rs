//! Content generation pipeline.
//!
//! Turns a matched trend into a complete, compliance-checked post candidate:
//! niche keyword matching selects a visual template, the templated image and
//! caption requests go to the generation backends, and the assembled post is
//! validated against the content rules (single disclosure, hashtag count,
//! caption length, prohibited claims). The two backend calls are the only
//! suspend points; everything else is a pure transformation.

mod compliance;
mod niche;
mod pipeline;

pub use compliance::{
    ComplianceConfig, ComplianceViolation, DisclosureTexts, DisclosureVariant,
};
pub use niche::{default_niches, subniche_style, NicheConfig, VisualStyle};
pub use pipeline::{
    AffiliateLinkFormatter, BackendError, CaptionRequest, ContentConfig, ContentPipeline,
    ImageBackend, ImageRef, ImageRequest, PipelineError, PostCandidate, PreparedPost,
    TextBackend,
};
