//! Microblog adapter.
//!
//! Resolves the session behind the access token, then fetches the author's
//! most recent feed items (limit 50) with an opaque cursor.

use super::types::{BlueskyRaw, ProviderPayload};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const API_URL: &str = "https://bsky.social/xrpc";
const FEED_LIMIT: u32 = 50;

pub struct BlueskyProvider {
    client: Client,
    timeout: Duration,
}

impl BlueskyProvider {
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
            return Err(classify_status(status, &headers, &body, Utc::now().timestamp()));
        }

        let parsed = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse { message: format!("{} at {}", e, path) })?;
        Ok((parsed, headers))
    }
}

#[derive(Deserialize)]
struct Session {
    did: String,
}

#[async_trait]
impl Provider for BlueskyProvider {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let (session, _) = self
            .get("/com.atproto.server.getSession", &[], token)
            .await?;
        let session: Session = serde_json::from_value(session)
            .map_err(|e| ProviderError::Parse { message: format!("session: {}", e) })?;

        let limit = FEED_LIMIT.to_string();
        let (feed_body, headers) = self
            .get(
                "/app.bsky.feed.getAuthorFeed",
                &[("actor", session.did.as_str()), ("limit", limit.as_str())],
                token,
            )
            .await?;

        let feed = feed_body
            .get("feed")
            .and_then(|f| f.as_array())
            .cloned()
            .unwrap_or_default();
        let cursor = feed_body
            .get("cursor")
            .and_then(|c| c.as_str())
            .map(|c| c.to_string());

        Ok(FetchResult {
            payload: ProviderPayload::Bluesky(BlueskyRaw {
                feed,
                cursor,
                fetched_at: Some(Utc::now()),
            }),
            rate: RateHeaders::from_headers(&headers),
        })
    }
}
