//! Pure normalizers: platform raw payloads → common timeline items.
//!
//! Normalizers never fail: a malformed item is dropped, and a payload whose
//! top-level shape is unrecognizable yields no items and logs a parse error.

use super::item::{
    CommentPayload, CommitPayload, ItemPayload, PostPayload, PullRequestPayload, TaskPayload,
    TimelineItem, VideoPayload,
};
use crate::models::Platform;
use crate::providers::types::{GithubRaw, RedditRaw, TwitterRaw};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Title length cap for most platforms.
const TITLE_MAX: usize = 72;
/// Microblog titles allow a little more room.
const MICROBLOG_TITLE_MAX: usize = 100;

/// Dispatch to the platform's normalizer.
pub fn normalize(platform: Platform, raw: &Value) -> Vec<TimelineItem> {
    match platform {
        Platform::Github => normalize_github(raw),
        Platform::Bluesky => normalize_bluesky(raw),
        Platform::Youtube => normalize_youtube(raw),
        Platform::Devpad => normalize_devpad(raw),
        Platform::Reddit => normalize_reddit(raw),
        Platform::Twitter => normalize_twitter(raw),
    }
}

/// UTC calendar date key, `YYYY-MM-DD`.
pub fn extract_date_key(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

/// First line of `text`, truncated to `max` characters with a trailing
/// ellipsis when longer.
fn title_of(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim_end();
    if line.chars().count() > max {
        let mut out: String = line.chars().take(max).collect();
        out.push('…');
        out
    } else {
        line.to_string()
    }
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn log_parse_error(platform: Platform, detail: &str) {
    tracing::warn!(platform = %platform, detail, "Unrecognized raw payload shape, producing no items");
}

// ── Git host ─────────────────────────────────────────────────────────────

pub fn normalize_github(raw: &Value) -> Vec<TimelineItem> {
    let typed: GithubRaw = match serde_json::from_value(raw.clone()) {
        Ok(typed) => typed,
        Err(e) => {
            // Old snapshots may still carry the legacy events shape; convert
            // at read time rather than persisting it.
            if let Some(items) = legacy_github_events(raw) {
                return items;
            }
            log_parse_error(Platform::Github, &e.to_string());
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    // Most recent PR event wins per (repo, number).
    let mut prs: HashMap<(String, i64), TimelineItem> = HashMap::new();

    for (repo_name, data) in &typed.repos {
        for commit in &data.commits.commits {
            items.push(TimelineItem {
                id: format!("git:commit:{}:{}", repo_name, short_sha(&commit.sha)),
                platform: Platform::Github,
                timestamp: commit.timestamp,
                title: title_of(&commit.message, TITLE_MAX),
                url: commit.url.clone(),
                payload: ItemPayload::Commit(CommitPayload {
                    repo: repo_name.clone(),
                    sha: commit.sha.clone(),
                    message: commit.message.clone(),
                    branch: commit.branch.clone(),
                    additions: commit.additions,
                    deletions: commit.deletions,
                    files_changed: commit.files_changed,
                }),
            });
        }

        for pr in &data.prs.prs {
            let timestamp = pr.merged_at.unwrap_or(pr.created_at);
            let item = TimelineItem {
                id: format!("git:pr:{}:{}", repo_name, pr.number),
                platform: Platform::Github,
                timestamp,
                title: title_of(&pr.title, TITLE_MAX),
                url: pr.url.clone(),
                payload: ItemPayload::PullRequest(PullRequestPayload {
                    repo: repo_name.clone(),
                    number: pr.number,
                    title: pr.title.clone(),
                    state: pr.state.clone(),
                    action: pr.action.clone(),
                    head_ref: pr.head_ref.clone(),
                    base_ref: pr.base_ref.clone(),
                    commit_shas: pr.commit_shas.clone(),
                    merge_commit_sha: pr.merge_commit_sha.clone(),
                    commits: Vec::new(),
                }),
            };
            let key = (repo_name.clone(), pr.number);
            match prs.get(&key) {
                Some(existing) if existing.timestamp >= item.timestamp => {}
                _ => {
                    prs.insert(key, item);
                }
            }
        }
    }

    items.extend(prs.into_values());
    items
}

/// Read-time conversion of the legacy "events + embedded commits" shape.
fn legacy_github_events(raw: &Value) -> Option<Vec<TimelineItem>> {
    let events = raw.get("events")?.as_array()?;
    let mut items = Vec::new();
    for event in events {
        let repo = event.pointer("/repo/name").and_then(|v| v.as_str());
        let timestamp = str_of(event, "created_at").and_then(|s| parse_timestamp(&s));
        let (Some(repo), Some(timestamp)) = (repo, timestamp) else { continue };

        let branch = event
            .pointer("/payload/ref")
            .and_then(|v| v.as_str())
            .map(|r| r.trim_start_matches("refs/heads/").to_string())
            .unwrap_or_else(|| "main".to_string());

        let commits = event
            .pointer("/payload/commits")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for commit in commits {
            let (Some(sha), Some(message)) = (str_of(&commit, "sha"), str_of(&commit, "message"))
            else {
                continue;
            };
            items.push(TimelineItem {
                id: format!("git:commit:{}:{}", repo, short_sha(&sha)),
                platform: Platform::Github,
                timestamp,
                title: title_of(&message, TITLE_MAX),
                url: str_of(&commit, "url"),
                payload: ItemPayload::Commit(CommitPayload {
                    repo: repo.to_string(),
                    sha,
                    message,
                    branch: branch.clone(),
                    additions: None,
                    deletions: None,
                    files_changed: None,
                }),
            });
        }
    }
    Some(items)
}

// ── Microblog ────────────────────────────────────────────────────────────

const REPOST_MARKER: &str = "app.bsky.feed.defs#reasonRepost";

pub fn normalize_bluesky(raw: &Value) -> Vec<TimelineItem> {
    let Some(feed) = raw.get("feed").and_then(|v| v.as_array()) else {
        log_parse_error(Platform::Bluesky, "missing feed array");
        return Vec::new();
    };

    feed.iter().filter_map(normalize_bluesky_item).collect()
}

fn normalize_bluesky_item(entry: &Value) -> Option<TimelineItem> {
    let post = entry.get("post")?;
    let uri = post.get("uri")?.as_str()?;
    let rkey = uri.rsplit('/').next().filter(|s| !s.is_empty())?;
    let text = post.pointer("/record/text")?.as_str()?;
    let created = post
        .pointer("/record/createdAt")
        .or_else(|| post.get("indexedAt"))
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)?;
    let handle = post.pointer("/author/handle").and_then(|v| v.as_str())?;

    let count = |name: &str| post.get(name).and_then(|v| v.as_i64()).unwrap_or(0);
    let has_media = post
        .pointer("/embed/images")
        .and_then(|v| v.as_array())
        .map(|images| !images.is_empty())
        .unwrap_or(false);
    let is_reply = post.pointer("/record/reply").is_some();
    let is_repost = entry
        .pointer("/reason/$type")
        .and_then(|v| v.as_str())
        .map(|t| t == REPOST_MARKER)
        .unwrap_or(false);

    Some(TimelineItem {
        id: format!("bsky:post:{}", rkey),
        platform: Platform::Bluesky,
        timestamp: created,
        title: title_of(text, MICROBLOG_TITLE_MAX),
        url: Some(format!("https://bsky.app/profile/{}/post/{}", handle, rkey)),
        payload: ItemPayload::Post(PostPayload {
            content: text.to_string(),
            author_handle: handle.to_string(),
            reply_count: count("replyCount"),
            repost_count: count("repostCount"),
            like_count: count("likeCount"),
            has_media,
            is_reply,
            is_repost,
            subreddit: None,
            score: None,
        }),
    })
}

// ── Video ────────────────────────────────────────────────────────────────

pub fn normalize_youtube(raw: &Value) -> Vec<TimelineItem> {
    let Some(items) = raw.get("items").and_then(|v| v.as_array()) else {
        log_parse_error(Platform::Youtube, "missing items array");
        return Vec::new();
    };

    items.iter().filter_map(normalize_youtube_item).collect()
}

fn normalize_youtube_item(entry: &Value) -> Option<TimelineItem> {
    let snippet = entry.get("snippet")?;
    let video_id = snippet
        .pointer("/resourceId/videoId")
        .or_else(|| entry.pointer("/contentDetails/videoId"))
        .and_then(|v| v.as_str())?;
    let title = snippet.get("title")?.as_str()?;
    let published = entry
        .pointer("/contentDetails/videoPublishedAt")
        .or_else(|| snippet.get("publishedAt"))
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)?;

    // Prefer the largest thumbnail available.
    let thumbnail_url = ["high", "medium", "default"].iter().find_map(|size| {
        snippet
            .pointer(&format!("/thumbnails/{}/url", size))
            .and_then(|v| v.as_str())
            .map(String::from)
    });

    Some(TimelineItem {
        id: format!("yt:video:{}", video_id),
        platform: Platform::Youtube,
        timestamp: published,
        title: title_of(title, TITLE_MAX),
        url: Some(format!("https://www.youtube.com/watch?v={}", video_id)),
        payload: ItemPayload::Video(VideoPayload {
            channel_id: snippet
                .get("channelId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            channel_title: snippet
                .get("channelTitle")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            description: snippet
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            thumbnail_url,
        }),
    })
}

// ── Task tracker ─────────────────────────────────────────────────────────

pub fn normalize_devpad(raw: &Value) -> Vec<TimelineItem> {
    let Some(tasks) = raw.get("tasks").and_then(|v| v.as_array()) else {
        log_parse_error(Platform::Devpad, "missing tasks array");
        return Vec::new();
    };

    tasks.iter().filter_map(normalize_devpad_task).collect()
}

fn normalize_devpad_task(task: &Value) -> Option<TimelineItem> {
    let id = match task.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let title = str_of(task, "title").or_else(|| str_of(task, "name"))?;
    let updated = str_of(task, "updated_at").and_then(|s| parse_timestamp(&s))?;

    let field = |key: &str| str_of(task, key).unwrap_or_default();
    let date_field = |key: &str| str_of(task, key).and_then(|s| parse_timestamp(&s));

    Some(TimelineItem {
        id: format!("dp:task:{}", id),
        platform: Platform::Devpad,
        timestamp: updated,
        title: title_of(&title, TITLE_MAX),
        url: str_of(task, "url"),
        payload: ItemPayload::Task(TaskPayload {
            status: field("status"),
            priority: field("priority"),
            project: field("project"),
            tags: task
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            due_date: date_field("due_date"),
            completed_at: date_field("completed_at"),
        }),
    })
}

// ── Link aggregator ──────────────────────────────────────────────────────

pub fn normalize_reddit(raw: &Value) -> Vec<TimelineItem> {
    let typed: RedditRaw = match serde_json::from_value(raw.clone()) {
        Ok(typed) => typed,
        Err(e) => {
            log_parse_error(Platform::Reddit, &e.to_string());
            return Vec::new();
        }
    };

    let mut items = Vec::new();

    for post in &typed.posts {
        items.push(TimelineItem {
            id: format!("rd:post:{}", post.id),
            platform: Platform::Reddit,
            timestamp: post.created_at,
            title: title_of(&post.title, TITLE_MAX),
            url: Some(format!("https://reddit.com{}", post.permalink)),
            payload: ItemPayload::Post(PostPayload {
                content: post.selftext.clone(),
                author_handle: typed.meta.username.clone(),
                reply_count: post.num_comments,
                repost_count: 0,
                like_count: post.score,
                has_media: false,
                is_reply: false,
                is_repost: false,
                subreddit: Some(post.subreddit.clone()),
                score: Some(post.score),
            }),
        });
    }

    for comment in &typed.comments {
        let parent_url = if comment.link_permalink.is_empty() {
            None
        } else if comment.link_permalink.starts_with("http") {
            Some(comment.link_permalink.clone())
        } else {
            Some(format!("https://reddit.com{}", comment.link_permalink))
        };
        items.push(TimelineItem {
            id: format!("rd:comment:{}", comment.id),
            platform: Platform::Reddit,
            timestamp: comment.created_at,
            title: title_of(&comment.body, TITLE_MAX),
            url: Some(format!("https://reddit.com{}", comment.permalink)),
            payload: ItemPayload::Comment(CommentPayload {
                subreddit: comment.subreddit.clone(),
                link_title: comment.link_title.clone(),
                link_permalink: comment.link_permalink.clone(),
                score: comment.score,
                is_op: comment.is_submitter,
                parent_title: comment.link_title.clone(),
                parent_url,
            }),
        });
    }

    items
}

// ── Microblog-long ───────────────────────────────────────────────────────

pub fn normalize_twitter(raw: &Value) -> Vec<TimelineItem> {
    let typed: TwitterRaw = match serde_json::from_value(raw.clone()) {
        Ok(typed) => typed,
        Err(e) => {
            log_parse_error(Platform::Twitter, &e.to_string());
            return Vec::new();
        }
    };

    typed
        .tweets
        .iter()
        .map(|tweet| TimelineItem {
            id: format!("tw:tweet:{}", tweet.id),
            platform: Platform::Twitter,
            timestamp: tweet.created_at,
            title: title_of(&tweet.text, MICROBLOG_TITLE_MAX),
            url: tweet.url.clone(),
            payload: ItemPayload::Post(PostPayload {
                content: tweet.text.clone(),
                author_handle: typed.meta.username.clone(),
                reply_count: tweet.reply_count,
                repost_count: tweet.retweet_count,
                like_count: tweet.like_count,
                has_media: false,
                is_reply: tweet.is_reply,
                is_repost: tweet.is_retweet,
                subreddit: None,
                score: None,
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_truncates_first_line_with_ellipsis() {
        assert_eq!(title_of("short message\nsecond line", 72), "short message");
        let long = "x".repeat(80);
        let title = title_of(&long, 72);
        assert_eq!(title.chars().count(), 73);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn github_commit_items_use_short_sha_ids() {
        let raw = json!({
            "meta": {"username": "u1", "fetched_at": null},
            "repos": {
                "u1/p": {
                    "commits": {"commits": [{
                        "sha": "aaa111222333",
                        "message": "Initial commit\n\nbody",
                        "branch": "main",
                        "branches": ["main"],
                        "timestamp": "2024-01-15T14:00:00Z"
                    }], "total_commits": 1},
                    "prs": {"prs": []}
                }
            }
        });
        let items = normalize_github(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "git:commit:u1/p:aaa1112");
        assert_eq!(items[0].title, "Initial commit");
        assert!(matches!(items[0].payload, ItemPayload::Commit(_)));
    }

    #[test]
    fn github_pr_timestamp_prefers_merged_at_and_latest_wins() {
        let raw = json!({
            "meta": {"username": "u1", "fetched_at": null},
            "repos": {
                "u1/p": {
                    "commits": {"commits": [], "total_commits": 0},
                    "prs": {"prs": [
                        {
                            "number": 1, "title": "First", "state": "open", "action": "open",
                            "head_ref": "f", "base_ref": "main", "commit_shas": [],
                            "created_at": "2024-01-10T00:00:00Z"
                        },
                        {
                            "number": 1, "title": "First (merged)", "state": "merged", "action": "merged",
                            "head_ref": "f", "base_ref": "main", "commit_shas": [],
                            "created_at": "2024-01-10T00:00:00Z",
                            "merged_at": "2024-01-12T00:00:00Z"
                        }
                    ]}
                }
            }
        });
        let items = normalize_github(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "git:pr:u1/p:1");
        assert_eq!(items[0].timestamp.to_rfc3339(), "2024-01-12T00:00:00+00:00");
        assert_eq!(items[0].title, "First (merged)");
    }

    #[test]
    fn legacy_github_events_convert_at_read_time() {
        let raw = json!({
            "events": [{
                "repo": {"name": "u1/p"},
                "created_at": "2024-01-15T14:00:00Z",
                "payload": {
                    "ref": "refs/heads/dev",
                    "commits": [{"sha": "abc1234", "message": "Legacy commit"}]
                }
            }]
        });
        let items = normalize_github(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "git:commit:u1/p:abc1234");
        match &items[0].payload {
            ItemPayload::Commit(commit) => assert_eq!(commit.branch, "dev"),
            other => panic!("expected commit payload, got {:?}", other),
        }
    }

    #[test]
    fn github_garbage_yields_nothing() {
        assert!(normalize_github(&json!({"unexpected": true})).is_empty());
        assert!(normalize_github(&json!(42)).is_empty());
    }

    #[test]
    fn bluesky_post_semantics() {
        let raw = json!({
            "feed": [{
                "post": {
                    "uri": "at://did:plc:abc/app.bsky.feed.post/3kabc",
                    "author": {"handle": "user.bsky.social"},
                    "record": {
                        "text": "hello world\nmore text",
                        "createdAt": "2024-02-01T10:00:00Z"
                    },
                    "embed": {"images": [{"thumb": "x"}]},
                    "replyCount": 2, "repostCount": 1, "likeCount": 7
                },
                "reason": {"$type": "app.bsky.feed.defs#reasonRepost"}
            }]
        });
        let items = normalize_bluesky(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "bsky:post:3kabc");
        assert_eq!(items[0].title, "hello world");
        match &items[0].payload {
            ItemPayload::Post(post) => {
                assert!(post.has_media);
                assert!(post.is_repost);
                assert!(!post.is_reply);
                assert_eq!(post.like_count, 7);
            }
            other => panic!("expected post payload, got {:?}", other),
        }
    }

    #[test]
    fn bluesky_malformed_item_is_dropped() {
        let raw = json!({
            "feed": [
                {"post": {"uri": "at://x/y/3k1", "author": {"handle": "h"},
                 "record": {"text": "good", "createdAt": "2024-02-01T10:00:00Z"}}},
                {"post": {"uri": "at://x/y/3k2"}}
            ]
        });
        let items = normalize_bluesky(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "bsky:post:3k1");
    }

    #[test]
    fn youtube_prefers_high_thumbnail() {
        let raw = json!({
            "items": [{
                "snippet": {
                    "title": "My video",
                    "publishedAt": "2024-03-01T00:00:00Z",
                    "channelId": "c1",
                    "channelTitle": "Channel",
                    "description": "desc",
                    "resourceId": {"videoId": "vid123"},
                    "thumbnails": {
                        "default": {"url": "d.jpg"},
                        "medium": {"url": "m.jpg"},
                        "high": {"url": "h.jpg"}
                    }
                }
            }]
        });
        let items = normalize_youtube(&raw);
        assert_eq!(items[0].id, "yt:video:vid123");
        match &items[0].payload {
            ItemPayload::Video(video) => assert_eq!(video.thumbnail_url.as_deref(), Some("h.jpg")),
            other => panic!("expected video payload, got {:?}", other),
        }
    }

    #[test]
    fn youtube_falls_back_to_medium_then_default() {
        let raw = json!({
            "items": [{
                "snippet": {
                    "title": "t", "publishedAt": "2024-03-01T00:00:00Z",
                    "resourceId": {"videoId": "v"},
                    "thumbnails": {"default": {"url": "d.jpg"}}
                }
            }]
        });
        match &normalize_youtube(&raw)[0].payload {
            ItemPayload::Video(video) => assert_eq!(video.thumbnail_url.as_deref(), Some("d.jpg")),
            other => panic!("expected video payload, got {:?}", other),
        }
    }

    #[test]
    fn devpad_task_uses_updated_at() {
        let raw = json!({
            "tasks": [{
                "id": 42,
                "title": "Ship it",
                "status": "in_progress",
                "priority": "high",
                "project": "tidemark",
                "tags": ["rust", "engine"],
                "updated_at": "2024-04-01T09:00:00Z"
            }]
        });
        let items = normalize_devpad(&raw);
        assert_eq!(items[0].id, "dp:task:42");
        assert_eq!(items[0].timestamp.to_rfc3339(), "2024-04-01T09:00:00+00:00");
        match &items[0].payload {
            ItemPayload::Task(task) => {
                assert_eq!(task.status, "in_progress");
                assert_eq!(task.tags, vec!["rust", "engine"]);
            }
            other => panic!("expected task payload, got {:?}", other),
        }
    }

    #[test]
    fn reddit_comment_title_and_is_op() {
        let long_body = format!("{}\nsecond", "y".repeat(90));
        let raw = json!({
            "meta": {"username": "redditor", "subreddits_active": ["rust"], "fetched_at": null},
            "posts": [],
            "comments": [{
                "id": "c9",
                "body": long_body,
                "subreddit": "rust",
                "permalink": "/r/rust/comments/p1/t/c9/",
                "score": 12,
                "is_submitter": true,
                "link_title": "Original post",
                "link_permalink": "/r/rust/comments/p1/t/",
                "created_at": "2024-05-01T00:00:00Z"
            }]
        });
        let items = normalize_reddit(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "rd:comment:c9");
        assert!(items[0].title.ends_with('…'));
        assert_eq!(items[0].title.chars().count(), 73);
        match &items[0].payload {
            ItemPayload::Comment(comment) => {
                assert!(comment.is_op);
                assert_eq!(comment.parent_title, "Original post");
                assert_eq!(
                    comment.parent_url.as_deref(),
                    Some("https://reddit.com/r/rust/comments/p1/t/")
                );
            }
            other => panic!("expected comment payload, got {:?}", other),
        }
    }

    #[test]
    fn twitter_tweets_become_posts() {
        let raw = json!({
            "meta": {"user_id": "9", "username": "dev", "verified_type": "blue", "fetched_at": null},
            "tweets": [{
                "id": "555",
                "text": "shipping things",
                "created_at": "2024-06-01T00:00:00Z",
                "reply_count": 1, "retweet_count": 2, "like_count": 3,
                "is_reply": false, "is_retweet": true
            }]
        });
        let items = normalize_twitter(&raw);
        assert_eq!(items[0].id, "tw:tweet:555");
        match &items[0].payload {
            ItemPayload::Post(post) => {
                assert_eq!(post.author_handle, "dev");
                assert!(post.is_repost);
                assert_eq!(post.repost_count, 2);
            }
            other => panic!("expected post payload, got {:?}", other),
        }
    }

    #[test]
    fn top_level_schema_failure_produces_no_items() {
        assert!(normalize_reddit(&json!({"posts": "not-an-array"})).is_empty());
        assert!(normalize_twitter(&json!([])).is_empty());
        assert!(normalize_bluesky(&json!({})).is_empty());
        assert!(normalize_devpad(&json!({"tasks": 3})).is_empty());
        assert!(normalize_youtube(&json!(null)).is_empty());
    }
}
