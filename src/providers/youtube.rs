//! Video adapter.
//!
//! Fetches up to 50 items from the channel's uploads playlist. Quota
//! exhaustion arrives as 401/403 with a body mentioning "quota" and is
//! re-tagged as a rate limit with a one-hour wait.

use super::types::{ProviderPayload, YoutubeRaw};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_URL: &str = "https://www.googleapis.com/youtube/v3";
const PLAYLIST_PAGE_SIZE: u32 = 50;

/// Wait applied when the daily quota is exhausted.
const QUOTA_RETRY_SECS: u64 = 3600;

pub struct YoutubeProvider {
    client: Client,
    timeout: Duration,
}

impl YoutubeProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { client: Client::new(), timeout }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<(serde_json::Value, reqwest::header::HeaderMap), ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", API_URL, path))
            .timeout(self.timeout)
            .query(query)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            let code = status.as_u16();
            if (code == 401 || code == 403) && body.to_lowercase().contains("quota") {
                return Err(ProviderError::RateLimited { retry_after_secs: QUOTA_RETRY_SECS });
            }
            return Err(classify_status(status, &headers, &body, Utc::now().timestamp()));
        }

        let parsed = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse { message: format!("{} at {}", e, path) })?;
        Ok((parsed, headers))
    }
}

#[async_trait]
impl Provider for YoutubeProvider {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let (channels, _) = self
            .get("/channels", &[("part", "contentDetails"), ("mine", "true")], token)
            .await?;

        let channel = channels
            .get("items")
            .and_then(|i| i.as_array())
            .and_then(|i| i.first())
            .ok_or_else(|| ProviderError::Parse { message: "no channel for credential".into() })?;
        let channel_id = channel.get("id").and_then(|v| v.as_str()).map(String::from);
        let uploads = channel
            .pointer("/contentDetails/relatedPlaylists/uploads")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse { message: "missing uploads playlist".into() })?
            .to_string();

        let max = PLAYLIST_PAGE_SIZE.to_string();
        let (playlist, headers) = self
            .get(
                "/playlistItems",
                &[
                    ("part", "snippet,contentDetails"),
                    ("playlistId", uploads.as_str()),
                    ("maxResults", max.as_str()),
                ],
                token,
            )
            .await?;

        let items = playlist
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(FetchResult {
            payload: ProviderPayload::Youtube(YoutubeRaw {
                channel_id,
                items,
                fetched_at: Some(Utc::now()),
            }),
            rate: RateHeaders::from_headers(&headers),
        })
    }
}
