//! Incremental merge of new provider output into previously stored state.
//!
//! Multi-store platforms accumulate across fetches: each merge keys records
//! by a stable identifier, lets incoming records win on conflict, and reports
//! how many keys were genuinely new. Meta stores are overwritten wholly and
//! never pass through here.

use crate::providers::types::{
    GithubCommit, GithubCommitStore, GithubPrStore, GithubPullRequest, RedditComment, RedditPost,
    Tweet,
};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Merge commit stores on `sha`. Incoming wins on conflict, except that the
/// observed-branches set is unioned so a commit seen on several branches
/// keeps all of them. `total_commits` is recounted from the merged set.
pub fn merge_commits(
    existing: GithubCommitStore,
    incoming: GithubCommitStore,
) -> (GithubCommitStore, usize) {
    let mut by_sha: BTreeMap<String, GithubCommit> = existing
        .commits
        .into_iter()
        .map(|c| (c.sha.clone(), c))
        .collect();

    let mut new_count = 0;
    for mut commit in incoming.commits {
        match by_sha.remove(&commit.sha) {
            Some(previous) => {
                let branches: BTreeSet<String> = previous
                    .branches
                    .into_iter()
                    .chain(commit.branches.into_iter())
                    .collect();
                commit.branches = branches.into_iter().collect();
            }
            None => new_count += 1,
        }
        by_sha.insert(commit.sha.clone(), commit);
    }

    let mut commits: Vec<GithubCommit> = by_sha.into_values().collect();
    commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.sha.cmp(&b.sha)));

    let total_commits = commits.len();
    (GithubCommitStore { commits, total_commits }, new_count)
}

/// Merge pull-request stores on `number`. Incoming wins.
pub fn merge_prs(existing: GithubPrStore, incoming: GithubPrStore) -> (GithubPrStore, usize) {
    let mut by_number: BTreeMap<i64, GithubPullRequest> =
        existing.prs.into_iter().map(|pr| (pr.number, pr)).collect();

    let mut new_count = 0;
    for pr in incoming.prs {
        if by_number.insert(pr.number, pr).is_none() {
            new_count += 1;
        }
    }

    let mut prs: Vec<GithubPullRequest> = by_number.into_values().collect();
    prs.sort_by(|a, b| b.number.cmp(&a.number));
    (GithubPrStore { prs }, new_count)
}

/// Generic id-keyed merge for flat record lists. Incoming wins on conflict;
/// output is ordered by key for stable serialization.
fn merge_by_id<T, F>(existing: Vec<T>, incoming: Vec<T>, key: F) -> (Vec<T>, usize)
where
    F: Fn(&T) -> String,
{
    let mut by_id: BTreeMap<String, T> = existing.into_iter().map(|r| (key(&r), r)).collect();
    let mut new_count = 0;
    for record in incoming {
        if by_id.insert(key(&record), record).is_none() {
            new_count += 1;
        }
    }
    (by_id.into_values().collect(), new_count)
}

pub fn merge_posts(existing: Vec<RedditPost>, incoming: Vec<RedditPost>) -> (Vec<RedditPost>, usize) {
    merge_by_id(existing, incoming, |p| p.id.clone())
}

pub fn merge_comments(
    existing: Vec<RedditComment>,
    incoming: Vec<RedditComment>,
) -> (Vec<RedditComment>, usize) {
    merge_by_id(existing, incoming, |c| c.id.clone())
}

pub fn merge_tweets(existing: Vec<Tweet>, incoming: Vec<Tweet>) -> (Vec<Tweet>, usize) {
    merge_by_id(existing, incoming, |t| t.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(sha: &str, branches: &[&str], ts: i64) -> GithubCommit {
        GithubCommit {
            sha: sha.to_string(),
            message: format!("commit {}", sha),
            url: None,
            branch: branches.first().unwrap_or(&"main").to_string(),
            branches: branches.iter().map(|b| b.to_string()).collect(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            additions: None,
            deletions: None,
            files_changed: None,
        }
    }

    fn commit_store(commits: Vec<GithubCommit>) -> GithubCommitStore {
        GithubCommitStore { total_commits: commits.len(), commits }
    }

    #[test]
    fn commits_merge_by_sha_with_branch_union() {
        let existing = commit_store(vec![commit("aaa111", &["main"], 100)]);
        let incoming = commit_store(vec![
            commit("aaa111", &["release"], 100),
            commit("bbb222", &["main"], 200),
        ]);

        let (merged, new_count) = merge_commits(existing, incoming);

        assert_eq!(new_count, 1);
        assert_eq!(merged.total_commits, 2);
        let aaa = merged.commits.iter().find(|c| c.sha == "aaa111").unwrap();
        assert_eq!(aaa.branches, vec!["main", "release"]);
        // Newest first.
        assert_eq!(merged.commits[0].sha, "bbb222");
    }

    #[test]
    fn remerging_same_commits_reports_zero_new() {
        let store = commit_store(vec![commit("aaa111", &["main"], 100)]);
        let (merged, first) = merge_commits(GithubCommitStore::default(), store.clone());
        assert_eq!(first, 1);
        let (_, second) = merge_commits(merged, store);
        assert_eq!(second, 0);
    }

    fn pr(number: i64, title: &str) -> GithubPullRequest {
        GithubPullRequest {
            number,
            title: title.to_string(),
            state: "open".into(),
            action: "open".into(),
            head_ref: "feature".into(),
            base_ref: "main".into(),
            commit_shas: vec![],
            merge_commit_sha: None,
            url: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            merged_at: None,
        }
    }

    #[test]
    fn prs_merge_by_number_incoming_wins() {
        let existing = GithubPrStore { prs: vec![pr(1, "old title")] };
        let incoming = GithubPrStore { prs: vec![pr(1, "new title"), pr(2, "second")] };

        let (merged, new_count) = merge_prs(existing, incoming);

        assert_eq!(new_count, 1);
        assert_eq!(merged.prs.len(), 2);
        let one = merged.prs.iter().find(|p| p.number == 1).unwrap();
        assert_eq!(one.title, "new title");
    }

    #[test]
    fn tweets_merge_by_id() {
        let old = Tweet {
            id: "1".into(),
            text: "old".into(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            reply_count: 0,
            retweet_count: 0,
            like_count: 0,
            is_reply: false,
            is_retweet: false,
            url: None,
        };
        let mut updated = old.clone();
        updated.like_count = 5;
        let mut fresh = old.clone();
        fresh.id = "2".into();

        let (merged, new_count) = merge_tweets(vec![old], vec![updated, fresh]);
        assert_eq!(new_count, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().find(|t| t.id == "1").unwrap().like_count, 5);
    }
}
