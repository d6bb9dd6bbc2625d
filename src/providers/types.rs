//! Raw payload types produced by the provider adapters.
//!
//! These are the shapes persisted to the object store (and, for multi-store
//! platforms, merged incrementally). Collections that key by a stable id use
//! `BTreeMap` so serialization is deterministic and content hashes are
//! stable.

use crate::models::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tagged union over every platform's raw output. The scheduler dispatches
/// on this exhaustively.
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    Github(GithubRaw),
    Bluesky(BlueskyRaw),
    Youtube(YoutubeRaw),
    Devpad(DevpadRaw),
    Reddit(RedditRaw),
    Twitter(TwitterRaw),
}

impl ProviderPayload {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Github(_) => Platform::Github,
            Self::Bluesky(_) => Platform::Bluesky,
            Self::Youtube(_) => Platform::Youtube,
            Self::Devpad(_) => Platform::Devpad,
            Self::Reddit(_) => Platform::Reddit,
            Self::Twitter(_) => Platform::Twitter,
        }
    }

    /// The platform-specific JSON body as persisted to `raw/{platform}/{id}`.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Github(raw) => serde_json::to_value(raw),
            Self::Bluesky(raw) => serde_json::to_value(raw),
            Self::Youtube(raw) => serde_json::to_value(raw),
            Self::Devpad(raw) => serde_json::to_value(raw),
            Self::Reddit(raw) => serde_json::to_value(raw),
            Self::Twitter(raw) => serde_json::to_value(raw),
        }
    }
}

// ── Git host ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubRaw {
    pub meta: GithubAccountMeta,
    /// Keyed by repository `full_name` (`owner/repo`).
    #[serde(default)]
    pub repos: BTreeMap<String, GithubRepoData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubAccountMeta {
    pub username: String,
    #[serde(default)]
    pub repositories: Vec<GithubRepository>,
    #[serde(default)]
    pub total_repos_available: usize,
    #[serde(default)]
    pub repos_fetched: usize,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRepository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
    pub pushed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubRepoData {
    pub commits: GithubCommitStore,
    pub prs: GithubPrStore,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubCommitStore {
    #[serde(default)]
    pub commits: Vec<GithubCommit>,
    #[serde(default)]
    pub total_commits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommit {
    pub sha: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Branch the commit was observed on.
    pub branch: String,
    /// Every branch the commit has been observed on (set-union across
    /// incremental fetches).
    #[serde(default)]
    pub branches: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubPrStore {
    #[serde(default)]
    pub prs: Vec<GithubPullRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubPullRequest {
    pub number: i64,
    pub title: String,
    /// `open`, `closed`, or `merged`.
    pub state: String,
    #[serde(default)]
    pub action: String,
    pub head_ref: String,
    pub base_ref: String,
    #[serde(default)]
    pub commit_shas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

// ── Microblog (Bluesky) ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlueskyRaw {
    #[serde(default)]
    pub feed: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

// ── Video (YouTube) ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct YoutubeRaw {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    pub fetched_at: Option<DateTime<Utc>>,
}

// ── Task tracker (devpad) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevpadRaw {
    #[serde(default)]
    pub tasks: Vec<serde_json::Value>,
    pub fetched_at: Option<DateTime<Utc>>,
}

// ── Link aggregator (Reddit) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedditRaw {
    pub meta: RedditAccountMeta,
    #[serde(default)]
    pub posts: Vec<RedditPost>,
    #[serde(default)]
    pub comments: Vec<RedditComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedditAccountMeta {
    pub username: String,
    /// Union of subreddits observed across posts and comments.
    #[serde(default)]
    pub subreddits_active: Vec<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub permalink: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub selftext: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditComment {
    pub id: String,
    pub body: String,
    pub subreddit: String,
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub link_title: String,
    #[serde(default)]
    pub link_permalink: String,
    pub created_at: DateTime<Utc>,
}

// ── Microblog-long (Twitter) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwitterRaw {
    pub meta: TwitterAccountMeta,
    #[serde(default)]
    pub tweets: Vec<Tweet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwitterAccountMeta {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub verified_type: VerifiedType,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Account verification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifiedType {
    Blue,
    Business,
    Government,
    #[default]
    None,
}

impl VerifiedType {
    /// Map the API's `verified_type` string; anything unrecognized is `None`.
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "blue" => Self::Blue,
            "business" => Self::Business,
            "government" => Self::Government,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub is_retweet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_type_mapping() {
        assert_eq!(VerifiedType::from_api("blue"), VerifiedType::Blue);
        assert_eq!(VerifiedType::from_api("business"), VerifiedType::Business);
        assert_eq!(VerifiedType::from_api("government"), VerifiedType::Government);
        assert_eq!(VerifiedType::from_api(""), VerifiedType::None);
        assert_eq!(VerifiedType::from_api("gold"), VerifiedType::None);
    }

    #[test]
    fn repos_serialize_in_key_order() {
        let mut raw = GithubRaw::default();
        raw.repos.insert("z/last".into(), GithubRepoData::default());
        raw.repos.insert("a/first".into(), GithubRepoData::default());

        let json = serde_json::to_string(&raw).unwrap();
        let a = json.find("a/first").unwrap();
        let z = json.find("z/last").unwrap();
        assert!(a < z);
    }
}
