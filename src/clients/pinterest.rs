//! Pinterest API client: trend discovery, pin creation, token refresh.
//!
//! One client implements both [`TrendSource`] and [`PublishingApi`]; the
//! access token lives behind a shared handle so the refresher can swap it
//! after a 401 without rebuilding the client. Obviously malformed tokens
//! are rejected before any network call.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::content::PostCandidate;
use crate::publish::{ApiFailure, AuthRefresher, PublishingApi};
use crate::trends::{RawTrend, TrendError, TrendSource};

const DEFAULT_BASE_URL: &str = "https://api.pinterest.com";

/// Connection settings for the Pinterest client.
#[derive(Debug, Clone)]
pub struct PinterestConfig {
    pub access_token: String,
    pub board_id: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl PinterestConfig {
    /// Create a config pointed at the production API.
    pub fn new(access_token: impl Into<String>, board_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            board_id: board_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }

    /// Point the client at a custom base URL (mock server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Sanity check on the token shape before spending a network call on it.
fn token_looks_valid(token: &str) -> bool {
    token.starts_with("pina_") && token.len() > 30
}

/// Pinterest trends and pins client.
pub struct PinterestClient {
    client: Client,
    base_url: String,
    board_id: String,
    token: Arc<RwLock<String>>,
}

impl PinterestClient {
    /// Create a client from the given configuration.
    pub fn new(config: PinterestConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("glowpost/0.2")
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            board_id: config.board_id,
            token: Arc::new(RwLock::new(config.access_token)),
        })
    }

    /// Shared handle to the access token, for wiring up a refresher.
    pub fn token_handle(&self) -> Arc<RwLock<String>> {
        Arc::clone(&self.token)
    }

    /// The API base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn current_token(&self) -> String {
        self.token.read().map(|t| t.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    data: Vec<TrendDatum>,
}

#[derive(Debug, Deserialize)]
struct TrendDatum {
    query: String,
    #[serde(default)]
    volume: u64,
}

#[async_trait]
impl TrendSource for PinterestClient {
    async fn fetch(&self, _niche_keywords: &[String]) -> Result<Vec<RawTrend>, TrendError> {
        let token = self.current_token();
        if !token_looks_valid(&token) {
            return Err(TrendError::Unavailable(
                "access token format is invalid".to_string(),
            ));
        }

        let url = format!("{}/v5/trending/topics", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("scope", "beauty"), ("region", "US"), ("limit", "50")])
            .send()
            .await
            .map_err(|e| TrendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrendError::Unavailable(format!("{status}: {body}")));
        }

        let parsed: TrendsResponse = response
            .json()
            .await
            .map_err(|e| TrendError::Unavailable(format!("malformed trends body: {e}")))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|datum| RawTrend {
                topic: datum.query,
                popularity: datum.volume,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CreatePinResponse {
    id: String,
}

#[async_trait]
impl PublishingApi for PinterestClient {
    async fn create_post(&self, candidate: &PostCandidate) -> Result<String, ApiFailure> {
        let token = self.current_token();
        let url = format!("{}/v5/pins", self.base_url);
        let description = format!("{} {}", candidate.caption, candidate.hashtags.join(" "));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({
                "board_id": self.board_id,
                "title": candidate.title,
                "description": description,
                "link": candidate.affiliate_link,
                "alt_text": candidate.alt_text,
                "media_source": {
                    "source_type": "image_url",
                    "url": candidate.image_url,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(ApiFailure::from_status(status.as_u16(), body, retry_after));
        }

        let parsed: CreatePinResponse = response.json().await.map_err(|e| {
            ApiFailure::Unexpected {
                status: status.as_u16(),
                body: format!("malformed create-pin body: {e}"),
            }
        })?;
        Ok(parsed.id)
    }
}

/// OAuth token refresher for the Pinterest API.
///
/// Exchanges the stored refresh token for a fresh access token and installs
/// it into the shared handle used by [`PinterestClient`].
pub struct PinterestTokenRefresher {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    refresh_token: String,
    token: Arc<RwLock<String>>,
}

impl PinterestTokenRefresher {
    /// Create a refresher bound to a client's token handle.
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        token: Arc<RwLock<String>>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("glowpost/0.2")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            refresh_token: refresh_token.into(),
            token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl AuthRefresher for PinterestTokenRefresher {
    async fn refresh(&self) -> Result<(), String> {
        let url = format!("{}/v5/oauth/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.app_id, Some(&self.app_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {body}"));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed token body: {e}"))?;

        if let Ok(mut token) = self.token.write() {
            *token = parsed.access_token;
        }
        tracing::info!("access token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DisclosureVariant;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_TOKEN: &str = "pina_0123456789abcdef0123456789abcdef";

    fn candidate() -> PostCandidate {
        PostCandidate {
            topic: "vitamin c serum".to_string(),
            title: "Vitamin C Serum".to_string(),
            caption: "caption".to_string(),
            image_url: "https://img.example/x.png".to_string(),
            affiliate_link: "https://www.amazon.com/s?k=serum&tag=t".to_string(),
            disclosure: DisclosureVariant::Standard,
            hashtags: vec!["#A1".to_string(), "#B2".to_string(), "#C3".to_string()],
            alt_text: "photo".to_string(),
        }
    }

    fn client_for(server: &MockServer) -> PinterestClient {
        PinterestClient::new(
            PinterestConfig::new(TEST_TOKEN, "board-1").with_base_url(server.uri()),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn test_fetch_trends_maps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/trending/topics"))
            .and(query_param("scope", "beauty"))
            .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"query": "vitamin c serum", "volume": 900},
                    {"query": "curly hair care", "volume": 800},
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let trends = client.fetch(&[]).await.expect("fetch");
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].topic, "vitamin c serum");
        assert_eq!(trends[0].popularity, 900);
    }

    #[tokio::test]
    async fn test_malformed_token_fails_before_network() {
        let client = PinterestClient::new(PinterestConfig::new("bogus", "board-1"))
            .expect("client");
        let err = client.fetch(&[]).await.expect_err("must fail");
        assert!(matches!(err, TrendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_create_pin_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v5/pins"))
            .and(body_partial_json(json!({
                "board_id": "board-1",
                "media_source": {"source_type": "image_url"}
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "pin-987"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pin_id = client.create_post(&candidate()).await.expect("create");
        assert_eq!(pin_id, "pin-987");
    }

    #[tokio::test]
    async fn test_create_pin_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v5/pins"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("Retry-After", "12"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.create_post(&candidate()).await.expect_err("error");
        assert!(matches!(
            err,
            ApiFailure::RateLimited {
                retry_after_secs: Some(12)
            }
        ));
    }

    #[tokio::test]
    async fn test_refresher_installs_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v5/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "pina_new_token_0123456789abcdef012345",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let refresher = PinterestTokenRefresher::new(
            server.uri(),
            "app-id",
            "app-secret",
            "refresh-token",
            client.token_handle(),
        )
        .expect("refresher");

        refresher.refresh().await.expect("refresh");
        assert_eq!(
            client.current_token(),
            "pina_new_token_0123456789abcdef012345"
        );
    }
}
