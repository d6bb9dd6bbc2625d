//! Core entity types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upstream platforms the engine knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Github,
    Bluesky,
    Youtube,
    Devpad,
    Reddit,
    Twitter,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Bluesky => "bluesky",
            Self::Youtube => "youtube",
            Self::Devpad => "devpad",
            Self::Reddit => "reddit",
            Self::Twitter => "twitter",
        }
    }

    /// Parse a platform name as stored in the database or a store id.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(Self::Github),
            "bluesky" => Some(Self::Bluesky),
            "youtube" => Some(Self::Youtube),
            "devpad" => Some(Self::Devpad),
            "reddit" => Some(Self::Reddit),
            "twitter" => Some(Self::Twitter),
            _ => None,
        }
    }

    /// Whether this platform persists into multiple sub-stores that are
    /// merged incrementally (as opposed to a single raw snapshot).
    pub fn is_multi_store(&self) -> bool {
        matches!(self, Self::Github | Self::Reddit | Self::Twitter)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream credential record, potentially shared by multiple users.
///
/// Accounts are created by the external OAuth flow; the engine only reads
/// them (plus the `last_fetched_at` bookkeeping column).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_username: Option<String>,
    pub encrypted_access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role a user holds on a shared account. Only owners may mutate the
/// account; any member's timeline incorporates the account's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Membership relation between a user and an account.
/// Unique on `(user_id, account_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMember {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub role: MemberRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_roundtrip() {
        for p in [
            Platform::Github,
            Platform::Bluesky,
            Platform::Youtube,
            Platform::Devpad,
            Platform::Reddit,
            Platform::Twitter,
        ] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse("myspace"), None);
    }

    #[test]
    fn multi_store_platforms() {
        assert!(Platform::Github.is_multi_store());
        assert!(Platform::Reddit.is_multi_store());
        assert!(Platform::Twitter.is_multi_store());
        assert!(!Platform::Bluesky.is_multi_store());
        assert!(!Platform::Youtube.is_multi_store());
        assert!(!Platform::Devpad.is_multi_store());
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!(MemberRole::parse("owner"), Some(MemberRole::Owner));
        assert_eq!(MemberRole::parse("admin"), None);
    }
}
