//! Microblog-long adapter.
//!
//! Fetches a bounded page of the user's authored posts together with the
//! account's verification tier.

use super::types::{ProviderPayload, Tweet, TwitterAccountMeta, TwitterRaw, VerifiedType};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const API_URL: &str = "https://api.twitter.com/2";
const PAGE_SIZE: u32 = 100;

pub struct TwitterProvider {
    client: Client,
    timeout: Duration,
}

impl TwitterProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { client: Client::new(), timeout }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<(Value, reqwest::header::HeaderMap), ProviderError> {
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

fn parse_tweet(item: &Value, username: &str) -> Option<Tweet> {
    let id = item.get("id")?.as_str()?.to_string();
    let text = item.get("text")?.as_str()?.to_string();
    let created_at = item
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

    let metric = |name: &str| {
        item.pointer(&format!("/public_metrics/{}", name))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    };

    let referenced = item
        .get("referenced_tweets")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let has_ref = |kind: &str| {
        referenced
            .iter()
            .any(|r| r.get("type").and_then(|t| t.as_str()) == Some(kind))
    };

    Some(Tweet {
        url: Some(format!("https://twitter.com/{}/status/{}", username, id)),
        is_reply: has_ref("replied_to"),
        is_retweet: has_ref("retweeted"),
        reply_count: metric("reply_count"),
        retweet_count: metric("retweet_count"),
        like_count: metric("like_count"),
        id,
        text,
        created_at,
    })
}

#[async_trait]
impl Provider for TwitterProvider {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let (me, _) = self
            .get("/users/me", &[("user.fields", "verified_type")], token)
            .await?;
        let data = me
            .get("data")
            .ok_or_else(|| ProviderError::Parse { message: "me endpoint without data".into() })?;
        let user_id = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse { message: "user without id".into() })?
            .to_string();
        let username = data
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let verified_type = data
            .get("verified_type")
            .and_then(|v| v.as_str())
            .map(VerifiedType::from_api)
            .unwrap_or_default();

        let max = PAGE_SIZE.to_string();
        let (timeline, headers) = self
            .get(
                &format!("/users/{}/tweets", user_id),
                &[
                    ("max_results", max.as_str()),
                    ("tweet.fields", "created_at,public_metrics,referenced_tweets"),
                ],
                token,
            )
            .await?;

        let tweets: Vec<Tweet> = timeline
            .get("data")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|t| parse_tweet(t, &username)).collect())
            .unwrap_or_default();

        Ok(FetchResult {
            payload: ProviderPayload::Twitter(TwitterRaw {
                meta: TwitterAccountMeta {
                    user_id,
                    username,
                    verified_type,
                    fetched_at: Some(Utc::now()),
                },
                tweets,
            }),
            rate: RateHeaders::from_headers(&headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tweet_parse_with_metrics_and_references() {
        let item = json!({
            "id": "123",
            "text": "replying to someone",
            "created_at": "2024-03-05T08:30:00Z",
            "public_metrics": {"reply_count": 1, "retweet_count": 2, "like_count": 9},
            "referenced_tweets": [{"type": "replied_to", "id": "99"}]
        });
        let tweet = parse_tweet(&item, "someone").unwrap();
        assert!(tweet.is_reply);
        assert!(!tweet.is_retweet);
        assert_eq!(tweet.like_count, 9);
        assert_eq!(
            tweet.url.as_deref(),
            Some("https://twitter.com/someone/status/123")
        );
    }

    #[test]
    fn tweet_without_timestamp_is_dropped() {
        let item = json!({"id": "123", "text": "no date"});
        assert!(parse_tweet(&item, "x").is_none());
    }
}
