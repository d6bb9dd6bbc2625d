//! Link-aggregator adapter.
//!
//! Paginates the user's submitted posts and comments, capped at configurable
//! maxima. Reddit requires a descriptive User-Agent on every call.

use super::types::{ProviderPayload, RedditAccountMeta, RedditComment, RedditPost, RedditRaw};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

const API_URL: &str = "https://oauth.reddit.com";
const USER_AGENT: &str = "web:tidemark:v0.3 (activity aggregator)";
const PAGE_SIZE: u32 = 100;

pub struct RedditProvider {
    client: Client,
    timeout: Duration,
    max_posts: usize,
    max_comments: usize,
}

impl RedditProvider {
    pub fn new(timeout: Duration, max_posts: usize, max_comments: usize) -> Self {
        Self { client: Client::new(), timeout, max_posts, max_comments }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<(Value, reqwest::header::HeaderMap), ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", API_URL, path))
            .timeout(self.timeout)
            .query(query)
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", USER_AGENT)
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

    /// Walk a listing endpoint until `cap` items or the cursor runs out.
    async fn paginate(
        &self,
        path: &str,
        cap: usize,
        token: &str,
    ) -> Result<(Vec<Value>, reqwest::header::HeaderMap), ProviderError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        let mut last_headers = reqwest::header::HeaderMap::new();

        loop {
            let mut query = vec![("limit".to_string(), PAGE_SIZE.to_string())];
            if let Some(cursor) = &after {
                query.push(("after".to_string(), cursor.clone()));
            }
            let query: Vec<(&str, String)> =
                query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

            let (page, headers) = self.get(path, &query, token).await?;
            last_headers = headers;

            let children = page
                .pointer("/data/children")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            if children.is_empty() {
                break;
            }
            items.extend(children);

            if items.len() >= cap {
                items.truncate(cap);
                break;
            }
            match page.pointer("/data/after").and_then(|a| a.as_str()) {
                Some(cursor) if !cursor.is_empty() => after = Some(cursor.to_string()),
                _ => break,
            }
        }

        Ok((items, last_headers))
    }
}

fn created_at(data: &Value) -> Option<DateTime<Utc>> {
    data.get("created_utc")
        .and_then(|v| v.as_f64())
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

/// `t3` listing child → post record. Malformed children yield `None` and are
/// skipped.
fn parse_post(child: &Value) -> Option<RedditPost> {
    let data = child.get("data")?;
    Some(RedditPost {
        id: data.get("id")?.as_str()?.to_string(),
        title: data.get("title")?.as_str()?.to_string(),
        subreddit: data.get("subreddit")?.as_str()?.to_string(),
        permalink: data.get("permalink")?.as_str()?.to_string(),
        url: data.get("url").and_then(|v| v.as_str()).map(String::from),
        score: data.get("score").and_then(|v| v.as_i64()).unwrap_or(0),
        num_comments: data.get("num_comments").and_then(|v| v.as_i64()).unwrap_or(0),
        selftext: data
            .get("selftext")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        created_at: created_at(data)?,
    })
}

/// `t1` listing child → comment record.
fn parse_comment(child: &Value) -> Option<RedditComment> {
    let data = child.get("data")?;
    Some(RedditComment {
        id: data.get("id")?.as_str()?.to_string(),
        body: data.get("body")?.as_str()?.to_string(),
        subreddit: data.get("subreddit")?.as_str()?.to_string(),
        permalink: data.get("permalink")?.as_str()?.to_string(),
        score: data.get("score").and_then(|v| v.as_i64()).unwrap_or(0),
        is_submitter: data
            .get("is_submitter")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        link_title: data
            .get("link_title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        link_permalink: data
            .get("link_permalink")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        created_at: created_at(data)?,
    })
}

#[async_trait]
impl Provider for RedditProvider {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let (me, _) = self.get("/api/v1/me", &[], token).await?;
        let username = me
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse { message: "me endpoint without name".into() })?
            .to_string();

        let (post_children, _) = self
            .paginate(&format!("/user/{}/submitted", username), self.max_posts, token)
            .await?;
        let (comment_children, headers) = self
            .paginate(&format!("/user/{}/comments", username), self.max_comments, token)
            .await?;

        let posts: Vec<RedditPost> = post_children.iter().filter_map(parse_post).collect();
        let comments: Vec<RedditComment> =
            comment_children.iter().filter_map(parse_comment).collect();

        let subreddits_active: BTreeSet<String> = posts
            .iter()
            .map(|p| p.subreddit.clone())
            .chain(comments.iter().map(|c| c.subreddit.clone()))
            .collect();

        Ok(FetchResult {
            payload: ProviderPayload::Reddit(RedditRaw {
                meta: RedditAccountMeta {
                    username,
                    subreddits_active: subreddits_active.into_iter().collect(),
                    fetched_at: Some(Utc::now()),
                },
                posts,
                comments,
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
    fn parse_post_requires_core_fields() {
        let good = json!({"data": {
            "id": "abc", "title": "Hello", "subreddit": "rust",
            "permalink": "/r/rust/comments/abc/hello/",
            "score": 10, "num_comments": 3, "created_utc": 1705312800.0
        }});
        let post = parse_post(&good).unwrap();
        assert_eq!(post.id, "abc");
        assert_eq!(post.subreddit, "rust");

        let missing_title = json!({"data": {"id": "abc", "subreddit": "rust",
            "permalink": "/x", "created_utc": 1705312800.0}});
        assert!(parse_post(&missing_title).is_none());
    }

    #[test]
    fn parse_comment_defaults_optional_fields() {
        let child = json!({"data": {
            "id": "c1", "body": "Nice post", "subreddit": "rust",
            "permalink": "/r/rust/comments/abc/hello/c1/",
            "created_utc": 1705312800.0
        }});
        let comment = parse_comment(&child).unwrap();
        assert_eq!(comment.score, 0);
        assert!(!comment.is_submitter);
        assert_eq!(comment.link_title, "");
    }
}
