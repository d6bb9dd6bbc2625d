//! Store identities.
//!
//! Every logical blob namespace has a stable `/`-delimited ASCII id. This is
//! the single parser for those ids; callers never split the strings
//! themselves. Components must not contain `/`.

use crate::models::Platform;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum StoreIdError {
    #[error("Invalid store id: {0}")]
    Invalid(String),

    #[error("Unknown platform in store id: {0}")]
    UnknownPlatform(String),

    #[error("Malformed uuid in store id: {0}")]
    BadUuid(String),
}

/// Parsed store identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreId {
    /// `raw/{platform}/{account_id}` — composite raw snapshot per account.
    Raw { platform: Platform, account_id: Uuid },
    /// `timeline/{user_id}` — assembled timeline artifact per user.
    Timeline { user_id: Uuid },
    /// `github/{account_id}/meta`
    GithubMeta { account_id: Uuid },
    /// `github/{account_id}/commits/{owner}/{repo}`
    GithubCommits { account_id: Uuid, owner: String, repo: String },
    /// `github/{account_id}/prs/{owner}/{repo}`
    GithubPrs { account_id: Uuid, owner: String, repo: String },
    /// `reddit/{account_id}/meta`
    RedditMeta { account_id: Uuid },
    /// `reddit/{account_id}/posts`
    RedditPosts { account_id: Uuid },
    /// `reddit/{account_id}/comments`
    RedditComments { account_id: Uuid },
    /// `twitter/{account_id}/meta`
    TwitterMeta { account_id: Uuid },
    /// `twitter/{account_id}/tweets`
    TwitterTweets { account_id: Uuid },
}

impl StoreId {
    /// Parse a canonical store id string.
    pub fn parse(s: &str) -> Result<Self, StoreIdError> {
        let invalid = || StoreIdError::Invalid(s.to_string());
        let uuid = |part: &str| {
            Uuid::parse_str(part).map_err(|_| StoreIdError::BadUuid(part.to_string()))
        };

        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        match parts.as_slice() {
            ["raw", platform, account_id] => {
                let platform = Platform::parse(platform)
                    .ok_or_else(|| StoreIdError::UnknownPlatform(platform.to_string()))?;
                Ok(Self::Raw { platform, account_id: uuid(account_id)? })
            }
            ["timeline", user_id] => Ok(Self::Timeline { user_id: uuid(user_id)? }),
            ["github", account_id, "meta"] => {
                Ok(Self::GithubMeta { account_id: uuid(account_id)? })
            }
            ["github", account_id, "commits", owner, repo] => Ok(Self::GithubCommits {
                account_id: uuid(account_id)?,
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            ["github", account_id, "prs", owner, repo] => Ok(Self::GithubPrs {
                account_id: uuid(account_id)?,
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            ["reddit", account_id, "meta"] => {
                Ok(Self::RedditMeta { account_id: uuid(account_id)? })
            }
            ["reddit", account_id, "posts"] => {
                Ok(Self::RedditPosts { account_id: uuid(account_id)? })
            }
            ["reddit", account_id, "comments"] => {
                Ok(Self::RedditComments { account_id: uuid(account_id)? })
            }
            ["twitter", account_id, "meta"] => {
                Ok(Self::TwitterMeta { account_id: uuid(account_id)? })
            }
            ["twitter", account_id, "tweets"] => {
                Ok(Self::TwitterTweets { account_id: uuid(account_id)? })
            }
            _ => Err(invalid()),
        }
    }

    /// The account whose namespace this store belongs to, if any.
    /// Timeline stores belong to users, not accounts.
    pub fn owner_account(&self) -> Option<Uuid> {
        match self {
            Self::Raw { account_id, .. }
            | Self::GithubMeta { account_id }
            | Self::GithubCommits { account_id, .. }
            | Self::GithubPrs { account_id, .. }
            | Self::RedditMeta { account_id }
            | Self::RedditPosts { account_id }
            | Self::RedditComments { account_id }
            | Self::TwitterMeta { account_id }
            | Self::TwitterTweets { account_id } => Some(*account_id),
            Self::Timeline { .. } => None,
        }
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw { platform, account_id } => write!(f, "raw/{}/{}", platform, account_id),
            Self::Timeline { user_id } => write!(f, "timeline/{}", user_id),
            Self::GithubMeta { account_id } => write!(f, "github/{}/meta", account_id),
            Self::GithubCommits { account_id, owner, repo } => {
                write!(f, "github/{}/commits/{}/{}", account_id, owner, repo)
            }
            Self::GithubPrs { account_id, owner, repo } => {
                write!(f, "github/{}/prs/{}/{}", account_id, owner, repo)
            }
            Self::RedditMeta { account_id } => write!(f, "reddit/{}/meta", account_id),
            Self::RedditPosts { account_id } => write!(f, "reddit/{}/posts", account_id),
            Self::RedditComments { account_id } => write!(f, "reddit/{}/comments", account_id),
            Self::TwitterMeta { account_id } => write!(f, "twitter/{}/meta", account_id),
            Self::TwitterTweets { account_id } => write!(f, "twitter/{}/tweets", account_id),
        }
    }
}
