//! Collaborator implementations.
//!
//! The core consumes abstract interfaces (`TrendSource`, `ImageBackend`,
//! `TextBackend`, `PublishingApi`, `AffiliateLinkFormatter`); this module
//! provides the production HTTP clients plus the zero-cost mock set used by
//! dry-run mode and tests. Every HTTP client accepts a base-URL override so
//! it can be pointed at a mock server.

mod affiliate;
mod mock;
mod openai;
mod pinterest;

pub use affiliate::AmazonLinkFormatter;
pub use mock::{MockImageBackend, MockPublisher, MockTextBackend, MockTrendSource};
pub use openai::{OpenAiConfig, OpenAiImageBackend, OpenAiTextBackend};
pub use pinterest::{PinterestClient, PinterestConfig, PinterestTokenRefresher};
