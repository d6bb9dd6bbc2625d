//! The common normalized record and the timeline's grouped output types.

use crate::models::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One normalized activity record.
///
/// Serializes as `{id, platform, type, timestamp, title, url?, payload}`:
/// the payload enum is adjacently tagged and flattened so `type`
/// discriminates at the item level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

/// Tagged payload variants, one per item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ItemPayload {
    Commit(CommitPayload),
    PullRequest(PullRequestPayload),
    Post(PostPayload),
    Video(VideoPayload),
    Task(TaskPayload),
    Comment(CommentPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub repo: String,
    pub sha: String,
    pub message: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<i64>,
}

/// A commit attached to a pull request after absorption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorbedCommit {
    pub sha: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestPayload {
    pub repo: String,
    pub number: i64,
    pub title: String,
    /// `open`, `closed`, or `merged`.
    pub state: String,
    pub action: String,
    pub head_ref: String,
    pub base_ref: String,
    #[serde(default)]
    pub commit_shas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit_sha: Option<String>,
    /// Filled by the assembler from absorbed commit items.
    #[serde(default)]
    pub commits: Vec<AbsorbedCommit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub content: String,
    pub author_handle: String,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub repost_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub is_repost: bool,
    /// Set for link-aggregator posts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPayload {
    pub channel_id: String,
    pub channel_title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub status: String,
    pub priority: String,
    pub project: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub subreddit: String,
    pub link_title: String,
    pub link_permalink: String,
    pub score: i64,
    pub is_op: bool,
    pub parent_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
}

/// Literal discriminator carried by serialized commit groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitGroupTag {
    #[default]
    CommitGroup,
}

/// Orphan commits bundled by `(repo, branch, calendar date)`. A peer of
/// `TimelineItem` in timeline entries, not an item itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitGroup {
    #[serde(rename = "type", default)]
    pub tag: CommitGroupTag,
    pub repo: String,
    pub branch: String,
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub commits: Vec<TimelineItem>,
    pub total_additions: i64,
    pub total_deletions: i64,
    pub total_files_changed: i64,
}

/// A timeline entry: either a normalized item or a synthesized commit group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelineEntry {
    CommitGroup(CommitGroup),
    Item(TimelineItem),
}

impl TimelineEntry {
    /// Timestamp used for ordering within a date group: a group sorts by its
    /// newest commit.
    pub fn sort_timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Item(item) => item.timestamp,
            Self::CommitGroup(group) => group
                .commits
                .iter()
                .map(|c| c.timestamp)
                .max()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// One calendar day of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateGroup {
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub items: Vec<TimelineEntry>,
}

/// The JSON document stored at `timeline/{user_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineArtifact {
    pub user_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub groups: Vec<DateGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit_item() -> TimelineItem {
        TimelineItem {
            id: "git:commit:u1/p:aaa1111".into(),
            platform: Platform::Github,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            title: "Initial commit".into(),
            url: None,
            payload: ItemPayload::Commit(CommitPayload {
                repo: "u1/p".into(),
                sha: "aaa111".into(),
                message: "Initial commit".into(),
                branch: "main".into(),
                additions: Some(10),
                deletions: Some(2),
                files_changed: Some(3),
            }),
        }
    }

    #[test]
    fn item_serializes_with_item_level_type() {
        let json = serde_json::to_value(commit_item()).unwrap();
        assert_eq!(json["type"], "commit");
        assert_eq!(json["payload"]["sha"], "aaa111");
        assert_eq!(json["id"], "git:commit:u1/p:aaa1111");

        let back: TimelineItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, commit_item());
    }

    #[test]
    fn commit_group_carries_literal_tag() {
        let group = CommitGroup {
            tag: CommitGroupTag::default(),
            repo: "u1/p".into(),
            branch: "main".into(),
            date: "2024-01-15".into(),
            commits: vec![commit_item()],
            total_additions: 10,
            total_deletions: 2,
            total_files_changed: 3,
        };
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["type"], "commit_group");
    }

    #[test]
    fn entries_deserialize_to_the_right_variant() {
        let group_json = serde_json::json!({
            "type": "commit_group",
            "repo": "u1/p",
            "branch": "main",
            "date": "2024-01-15",
            "commits": [],
            "total_additions": 0,
            "total_deletions": 0,
            "total_files_changed": 0
        });
        assert!(matches!(
            serde_json::from_value::<TimelineEntry>(group_json).unwrap(),
            TimelineEntry::CommitGroup(_)
        ));

        let item_json = serde_json::to_value(commit_item()).unwrap();
        assert!(matches!(
            serde_json::from_value::<TimelineEntry>(item_json).unwrap(),
            TimelineEntry::Item(_)
        ));
    }
}
