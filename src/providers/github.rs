//! Git-host adapter.
//!
//! Fetches the authenticated user, the repositories they most recently
//! pushed to (bounded), and per repository the latest commits and open or
//! recently updated pull requests.

use super::types::{
    GithubAccountMeta, GithubCommit, GithubCommitStore, GithubPrStore, GithubPullRequest,
    GithubRaw, GithubRepoData, GithubRepository, ProviderPayload,
};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "tidemark/0.3";

/// Repositories tracked per account: the most recently pushed ones.
const MAX_TRACKED_REPOS: usize = 5;
const COMMITS_PER_REPO: u32 = 30;
const PRS_PER_REPO: u32 = 20;

pub struct GithubProvider {
    client: Client,
    timeout: Duration,
}

impl GithubProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { client: Client::new(), timeout }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<(T, HeaderMap), ProviderError> {
        let url = format!("{}{}", API_URL, path);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
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

        let parsed = serde_json::from_str(&body).map_err(|e| ProviderError::Parse {
            message: format!("{} at {}", e, path),
        })?;
        Ok((parsed, headers))
    }
}

#[async_trait]
impl Provider for GithubProvider {
    fn platform(&self) -> Platform {
        Platform::Github
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let (user, mut last_headers) = self.get_json::<ApiUser>("/user", token).await?;

        let (all_repos, headers) = self
            .get_json::<Vec<ApiRepo>>("/user/repos?sort=pushed&per_page=100", token)
            .await?;
        last_headers = headers;

        let total_repos_available = all_repos.len();
        let tracked: Vec<ApiRepo> = all_repos.into_iter().take(MAX_TRACKED_REPOS).collect();

        let mut repositories = Vec::with_capacity(tracked.len());
        let mut repos = BTreeMap::new();

        for repo in &tracked {
            let (branches, headers) = self
                .get_json::<Vec<ApiBranch>>(
                    &format!("/repos/{}/branches?per_page=100", repo.full_name),
                    token,
                )
                .await?;
            last_headers = headers;

            let (commits, headers) = self
                .get_json::<Vec<ApiCommitItem>>(
                    &format!(
                        "/repos/{}/commits?sha={}&per_page={}",
                        repo.full_name, repo.default_branch, COMMITS_PER_REPO
                    ),
                    token,
                )
                .await?;
            last_headers = headers;

            let (pulls, headers) = self
                .get_json::<Vec<ApiPull>>(
                    &format!(
                        "/repos/{}/pulls?state=all&sort=updated&direction=desc&per_page={}",
                        repo.full_name, PRS_PER_REPO
                    ),
                    token,
                )
                .await?;
            last_headers = headers;

            let mut prs = Vec::with_capacity(pulls.len());
            for pull in pulls {
                let (pull_commits, headers) = self
                    .get_json::<Vec<ApiPullCommit>>(
                        &format!(
                            "/repos/{}/pulls/{}/commits?per_page=100",
                            repo.full_name, pull.number
                        ),
                        token,
                    )
                    .await?;
                last_headers = headers;
                prs.push(pull.into_record(pull_commits));
            }

            let commit_records: Vec<GithubCommit> = commits
                .into_iter()
                .map(|c| c.into_record(&repo.default_branch))
                .collect();

            repositories.push(GithubRepository {
                owner: repo.owner.login.clone(),
                name: repo.name.clone(),
                full_name: repo.full_name.clone(),
                default_branch: repo.default_branch.clone(),
                branches: branches.into_iter().map(|b| b.name).collect(),
                is_private: repo.private,
                pushed_at: repo.pushed_at,
                updated_at: repo.updated_at,
            });
            repos.insert(
                repo.full_name.clone(),
                GithubRepoData {
                    commits: GithubCommitStore {
                        total_commits: commit_records.len(),
                        commits: commit_records,
                    },
                    prs: GithubPrStore { prs },
                },
            );
        }

        let raw = GithubRaw {
            meta: GithubAccountMeta {
                username: user.login,
                repos_fetched: repositories.len(),
                repositories,
                total_repos_available,
                fetched_at: Some(Utc::now()),
            },
            repos,
        };

        Ok(FetchResult {
            payload: ProviderPayload::Github(raw),
            rate: RateHeaders::from_headers(&last_headers),
        })
    }
}

// ── Upstream response shapes ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    full_name: String,
    #[serde(default)]
    private: bool,
    default_branch: String,
    owner: ApiOwner,
    pushed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
}

#[derive(Deserialize)]
struct ApiCommitItem {
    sha: String,
    html_url: Option<String>,
    commit: ApiCommitInner,
}

#[derive(Deserialize)]
struct ApiCommitInner {
    message: String,
    author: Option<ApiCommitSignature>,
    committer: Option<ApiCommitSignature>,
}

#[derive(Deserialize)]
struct ApiCommitSignature {
    date: Option<DateTime<Utc>>,
}

impl ApiCommitItem {
    fn into_record(self, branch: &str) -> GithubCommit {
        let timestamp = self
            .commit
            .author
            .as_ref()
            .and_then(|a| a.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|c| c.date))
            .unwrap_or_else(Utc::now);
        GithubCommit {
            sha: self.sha,
            message: self.commit.message,
            url: self.html_url,
            branch: branch.to_string(),
            branches: vec![branch.to_string()],
            timestamp,
            additions: None,
            deletions: None,
            files_changed: None,
        }
    }
}

#[derive(Deserialize)]
struct ApiPull {
    number: i64,
    title: String,
    state: String,
    html_url: Option<String>,
    merge_commit_sha: Option<String>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    head: ApiGitRef,
    base: ApiGitRef,
}

#[derive(Deserialize)]
struct ApiGitRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct ApiPullCommit {
    sha: String,
}

impl ApiPull {
    fn into_record(self, commits: Vec<ApiPullCommit>) -> GithubPullRequest {
        // The list endpoint reports merged PRs as "closed"; merged_at is the
        // authoritative signal.
        let state = if self.merged_at.is_some() {
            "merged".to_string()
        } else {
            self.state
        };
        GithubPullRequest {
            number: self.number,
            title: self.title,
            action: state.clone(),
            state,
            head_ref: self.head.git_ref,
            base_ref: self.base.git_ref,
            commit_shas: commits.into_iter().map(|c| c.sha).collect(),
            merge_commit_sha: self.merge_commit_sha,
            url: self.html_url,
            created_at: self.created_at,
            merged_at: self.merged_at,
        }
    }
}
