//! Zero-cost mock collaborators for dry-run mode and tests.
//!
//! Dry runs substitute these for the real clients: no network, no paid
//! calls, deterministic outcomes. The mock trends mirror the fixtures the
//! operator scripts have always used.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::content::{
    BackendError, CaptionRequest, ImageBackend, ImageRef, ImageRequest, TextBackend,
};
use crate::publish::{ApiFailure, PublishingApi};
use crate::trends::{RawTrend, TrendError, TrendSource};

/// Fixed trending feed: one topic per stock niche.
#[derive(Debug, Clone, Default)]
pub struct MockTrendSource;

#[async_trait]
impl TrendSource for MockTrendSource {
    async fn fetch(&self, _niche_keywords: &[String]) -> Result<Vec<RawTrend>, TrendError> {
        Ok(vec![
            RawTrend {
                topic: "natural skincare routine".to_string(),
                popularity: 1000,
            },
            RawTrend {
                topic: "curly hair care".to_string(),
                popularity: 800,
            },
            RawTrend {
                topic: "minimal makeup look".to_string(),
                popularity: 600,
            },
        ])
    }
}

/// Free image backend returning a placeholder reference.
#[derive(Debug, Clone, Default)]
pub struct MockImageBackend;

#[async_trait]
impl ImageBackend for MockImageBackend {
    async fn generate(&self, _request: &ImageRequest) -> Result<ImageRef, BackendError> {
        Ok(ImageRef {
            url: "https://example.com/mock-image.png".to_string(),
        })
    }

    fn cost(&self) -> Decimal {
        Decimal::ZERO
    }
}

/// Free text backend producing a deterministic caption body that lands
/// inside the request's character target.
#[derive(Debug, Clone, Default)]
pub struct MockTextBackend;

#[async_trait]
impl TextBackend for MockTextBackend {
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
        Decimal::ZERO
    }
}

/// Publishing stub that always succeeds with sequential mock IDs.
#[derive(Debug, Default)]
pub struct MockPublisher {
    counter: AtomicU64,
}

#[async_trait]
impl PublishingApi for MockPublisher {
    async fn create_post(
        &self,
        candidate: &crate::content::PostCandidate,
    ) -> Result<String, ApiFailure> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(topic = %candidate.topic, "dry run: would publish post");
        Ok(format!("mock-pin-{n}"))
    }
}
