//! Timeline assembly.
//!
//! Pure transformation from a user's normalized items to date-grouped
//! entries: commits claimed by a pull request are folded into it, orphan
//! commits are bundled by `(repo, branch, date)`, and everything is
//! partitioned into strictly descending date groups.

use super::item::{
    AbsorbedCommit, CommitGroup, CommitGroupTag, DateGroup, ItemPayload, TimelineEntry,
    TimelineItem,
};
use super::normalize::extract_date_key;
use std::collections::{BTreeMap, HashSet};

/// Assemble a user's items into date groups, newest first.
pub fn assemble(mut items: Vec<TimelineItem>) -> Vec<DateGroup> {
    // Newest first; id as tiebreaker for determinism.
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));

    let (commit_items, mut prs, others) = split_items(items);

    // Every sha claimed by a PR, including merge commits.
    let claimed: HashSet<&str> = prs
        .iter()
        .filter_map(|pr| match &pr.payload {
            ItemPayload::PullRequest(payload) => Some(payload),
            _ => None,
        })
        .flat_map(|payload| {
            payload
                .commit_shas
                .iter()
                .map(String::as_str)
                .chain(payload.merge_commit_sha.as_deref())
        })
        .collect();

    let mut orphans = Vec::new();
    let mut absorbed: BTreeMap<String, AbsorbedCommit> = BTreeMap::new();
    for item in commit_items {
        let ItemPayload::Commit(commit) = &item.payload else { continue };
        if claimed.contains(commit.sha.as_str()) {
            absorbed.insert(
                commit.sha.clone(),
                AbsorbedCommit {
                    sha: commit.sha.clone(),
                    message: commit.message.clone(),
                    url: item.url.clone(),
                },
            );
        } else {
            orphans.push(item);
        }
    }

    // Attach absorbed commits to their PRs, in commit_shas order, with the
    // merge commit appended when it was observed as a standalone commit.
    for pr in &mut prs {
        let ItemPayload::PullRequest(payload) = &mut pr.payload else { continue };
        let mut commits: Vec<AbsorbedCommit> = payload
            .commit_shas
            .iter()
            .filter_map(|sha| absorbed.get(sha).cloned())
            .collect();
        if let Some(merge_sha) = &payload.merge_commit_sha {
            if !payload.commit_shas.contains(merge_sha) {
                if let Some(commit) = absorbed.get(merge_sha) {
                    commits.push(commit.clone());
                }
            }
        }
        payload.commits = commits;
    }

    let groups = group_orphan_commits(orphans);

    let mut entries: Vec<TimelineEntry> = Vec::new();
    entries.extend(groups.into_iter().map(TimelineEntry::CommitGroup));
    entries.extend(prs.into_iter().map(TimelineEntry::Item));
    entries.extend(others.into_iter().map(TimelineEntry::Item));

    partition_by_date(entries)
}

/// Separate commits and PRs from everything else, preserving order.
fn split_items(
    items: Vec<TimelineItem>,
) -> (Vec<TimelineItem>, Vec<TimelineItem>, Vec<TimelineItem>) {
    let mut commits = Vec::new();
    let mut prs = Vec::new();
    let mut others = Vec::new();
    for item in items {
        match item.payload {
            ItemPayload::Commit(_) => commits.push(item),
            ItemPayload::PullRequest(_) => prs.push(item),
            _ => others.push(item),
        }
    }
    (commits, prs, others)
}

/// Bundle orphan commits sharing `(repo, branch, calendar date)`.
fn group_orphan_commits(orphans: Vec<TimelineItem>) -> Vec<CommitGroup> {
    let mut buckets: BTreeMap<(String, String, String), Vec<TimelineItem>> = BTreeMap::new();
    for item in orphans {
        let ItemPayload::Commit(commit) = &item.payload else { continue };
        let key = (
            commit.repo.clone(),
            commit.branch.clone(),
            extract_date_key(item.timestamp),
        );
        buckets.entry(key).or_default().push(item);
    }

    buckets
        .into_iter()
        .map(|((repo, branch, date), mut commits)| {
            commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));

            let sum = |pick: fn(&crate::timeline::item::CommitPayload) -> Option<i64>| {
                commits
                    .iter()
                    .filter_map(|item| match &item.payload {
                        ItemPayload::Commit(c) => pick(c),
                        _ => None,
                    })
                    .sum()
            };

            CommitGroup {
                tag: CommitGroupTag::default(),
                repo,
                branch,
                date,
                total_additions: sum(|c| c.additions),
                total_deletions: sum(|c| c.deletions),
                total_files_changed: sum(|c| c.files_changed),
                commits,
            }
        })
        .collect()
}

/// Partition entries by calendar date, emitting groups in strictly
/// descending date order; entries within a group run newest first.
fn partition_by_date(entries: Vec<TimelineEntry>) -> Vec<DateGroup> {
    let mut by_date: BTreeMap<String, Vec<TimelineEntry>> = BTreeMap::new();
    for entry in entries {
        let date = match &entry {
            TimelineEntry::CommitGroup(group) => group.date.clone(),
            TimelineEntry::Item(item) => extract_date_key(item.timestamp),
        };
        by_date.entry(date).or_default().push(entry);
    }

    by_date
        .into_iter()
        .rev()
        .map(|(date, mut items)| {
            items.sort_by(|a, b| b.sort_timestamp().cmp(&a.sort_timestamp()));
            DateGroup { date, items }
        })
        .collect()
}
