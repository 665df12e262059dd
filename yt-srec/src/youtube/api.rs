//! Quota-limited YouTube Data API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::monitor::LiveStatusResolver;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

/// Client for the `search?eventType=live` endpoint.
pub struct YoutubeApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YoutubeApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    fn search_url(&self, channel_id: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            &format!("{}/search", self.base_url.trim_end_matches('/')),
            &[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("eventType", "live"),
                ("type", "video"),
                ("key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| Error::config(format!("Invalid API base URL: {}", e)))
    }

    /// Live video ids currently broadcast by `channel_id`.
    pub async fn search_live(&self, channel_id: &str) -> Result<Vec<String>> {
        let url = self.search_url(channel_id)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Status API request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::ResourceExhausted("YouTube API quota exceeded".to_string()));
        }
        if !status.is_success() {
            return Err(Error::transient(format!("Status API returned {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transient(format!("Status API body read failed: {}", e)))?;
        parse_search_response(&body)
    }
}

fn parse_search_response(body: &str) -> Result<Vec<String>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| Error::transient(format!("Malformed status API response: {}", e)))?;
    Ok(response
        .items
        .into_iter()
        .filter_map(|item| item.id.video_id)
        .collect())
}

#[async_trait]
impl LiveStatusResolver for YoutubeApiClient {
    fn name(&self) -> &'static str {
        "youtube-api"
    }

    async fn resolve_live_stream(&self, channel_id: &str) -> Result<Option<String>> {
        let ids = self.search_live(channel_id).await?;
        debug!(channel_id = %channel_id, live = ids.len(), "Status API checked channel");
        Ok(ids.into_iter().next())
    }
}
