//! Generation backends over the OpenAI HTTP API.
//!
//! Two priced backends share one configuration: image generation
//! (`/v1/images/generations`) charged against the daily budget, and caption
//! generation (`/v1/chat/completions`) charged against the monthly budget.
//! Requests are bounded by per-call timeouts; failure classification feeds
//! the shared retry utility.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::content::{
    BackendError, CaptionRequest, ImageBackend, ImageRef, ImageRequest, TextBackend,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Connection settings shared by both backends.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Create a config pointed at the production API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: "dall-e-3".to_string(),
            text_model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 60,
        }
    }

    /// Point the client at a custom base URL (mock server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn build_client(&self) -> Result<Client, BackendError> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("glowpost/0.2")
            .build()?)
    }
}

async fn classify_response(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 429 {
        BackendError::RateLimited {
            retry_after_secs: retry_after,
        }
    } else if status.is_server_error() {
        BackendError::Transient(format!("server error {status}: {body}"))
    } else {
        BackendError::Api(format!("{status}: {body}"))
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: String,
}

/// DALL-E image generation, priced per call.
pub struct OpenAiImageBackend {
    client: Client,
    config: OpenAiConfig,
    cost: Decimal,
}

impl OpenAiImageBackend {
    /// Create an image backend; `cost` is the price of one call.
    pub fn new(config: OpenAiConfig, cost: Decimal) -> Result<Self, BackendError> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            config,
            cost,
        })
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageRef, BackendError> {
        let url = format!("{}/v1/images/generations", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.image_model,
                "prompt": request.prompt,
                "size": request.size,
                "quality": "standard",
                "n": 1,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_response(response).await);
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Deserialize(e.to_string()))?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Deserialize("empty image data".to_string()))?;

        tracing::info!(model = %self.config.image_model, "image generated");
        Ok(ImageRef { url: datum.url })
    }

    fn cost(&self) -> Decimal {
        self.cost
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat-completion caption generation, priced per call by token budget.
pub struct OpenAiTextBackend {
    client: Client,
    config: OpenAiConfig,
    cost: Decimal,
}

impl OpenAiTextBackend {
    /// Create a text backend; `cost` is the estimated price of one call.
    pub fn new(config: OpenAiConfig, cost: Decimal) -> Result<Self, BackendError> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            config,
            cost,
        })
    }
}

#[async_trait]
impl TextBackend for OpenAiTextBackend {
    async fn generate(&self, request: &CaptionRequest) -> Result<String, BackendError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.text_model,
                "messages": [
                    {
                        "role": "system",
                        "content": "You are a professional beauty influencer writing \
                                    engaging, benefit-focused Pinterest captions.",
                    },
                    { "role": "user", "content": request.prompt },
                ],
                "max_tokens": request.max_tokens,
                "temperature": 0.7,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_response(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Deserialize(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Deserialize("empty choices".to_string()))?;

        tracing::info!(model = %self.config.text_model, "caption generated");
        Ok(choice.message.content.trim().to_string())
    }

    fn cost(&self) -> Decimal {
        self.cost
    }
}
