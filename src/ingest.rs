//! The ingestion scheduler.
//!
//! One invocation enumerates active accounts, fans out per-account fetches
//! under the rate-policy gate, merges and stores what came back, then
//! rebuilds the timeline of every user whose accounts produced at least one
//! fresh snapshot. A failure on one account never aborts the run; fatal
//! errors are reserved for unreachable backends.

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::db::{Database, DbError, ParentRef};
use crate::merge;
use crate::models::{Account, Platform};
use crate::providers::types::{GithubRaw, GithubRepoData, ProviderPayload, RedditRaw, TwitterRaw};
use crate::providers::{Provider, ProviderError, ProviderRegistry};
use crate::ratelimit::RatePolicy;
use crate::store::{BlobStore, PutOptions, Snapshot, SnapshotStore, StoreError, StoreId};
use crate::timeline::{assemble, normalize, TimelineArtifact};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Role recorded on timeline → raw parent edges.
const PARENT_ROLE_SOURCE: &str = "source";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one invocation, for observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CronResult {
    pub processed_accounts: usize,
    pub updated_users: Vec<Uuid>,
    pub failed_accounts: Vec<Uuid>,
    pub timelines_generated: usize,
}

/// Summary of an account deletion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteSummary {
    pub deleted_stores: usize,
    pub affected_users: Vec<Uuid>,
}

/// Everything one invocation needs, cheaply cloneable into worker tasks.
#[derive(Clone)]
pub struct IngestContext {
    pub db: Database,
    pub snapshots: SnapshotStore,
    pub providers: ProviderRegistry,
    pub cipher: TokenCipher,
    pub policy: RatePolicy,
    pub provider_timeout: Duration,
    pub worker_concurrency: usize,
}

impl IngestContext {
    pub fn new(
        config: &Config,
        db: Database,
        blobs: Arc<dyn BlobStore>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            snapshots: SnapshotStore::new(db.clone(), blobs),
            db,
            providers,
            cipher: TokenCipher::from_passphrase(&config.secret),
            policy: RatePolicy::new(config.circuit_threshold, config.circuit_cooldown),
            provider_timeout: config.provider_timeout,
            worker_concurrency: config.worker_concurrency.max(1),
        }
    }

    /// One ingestion pass over every active account.
    pub async fn run_ingestion(&self) -> Result<CronResult, IngestError> {
        let accounts = self.db.active_accounts().await?;

        // One work item per distinct account, no matter how many users share
        // it; membership fans back in at rebuild time.
        let mut memberships: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        for account in &accounts {
            let users = self
                .db
                .members_of(account.id)
                .await?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            memberships.insert(account.id, users);
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_concurrency));
        let spawned: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
        let mut tasks: JoinSet<(Uuid, AccountOutcome)> = JoinSet::new();
        for account in accounts.clone() {
            let ctx = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = ctx.process_account(&account).await;
                (account.id, outcome)
            });
        }

        // Settle every task; a panic in one worker is a failure of that
        // account, not of the invocation.
        let mut outcomes: BTreeMap<Uuid, AccountOutcome> = BTreeMap::new();
        while let Some(settled) = tasks.join_next().await {
            match settled {
                Ok((account_id, outcome)) => {
                    outcomes.insert(account_id, outcome);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Account worker panicked");
                }
            }
        }
        // A panicked worker never reported an outcome; its account is still
        // a failed account for this invocation.
        for account_id in &spawned {
            outcomes.entry(*account_id).or_insert(AccountOutcome::Failed);
        }

        let failed_accounts: Vec<Uuid> = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, AccountOutcome::Failed))
            .map(|(id, _)| *id)
            .collect();

        // Users owed a rebuild: anyone holding an account that produced a
        // fresh snapshot this run.
        let mut users_to_rebuild: BTreeSet<Uuid> = BTreeSet::new();
        for (account_id, outcome) in &outcomes {
            if matches!(outcome, AccountOutcome::Success) {
                if let Some(users) = memberships.get(account_id) {
                    users_to_rebuild.extend(users.iter().copied());
                }
            }
        }

        // Each user's full account set, for collecting snapshots.
        let mut accounts_by_user: BTreeMap<Uuid, Vec<&Account>> = BTreeMap::new();
        for account in &accounts {
            if let Some(users) = memberships.get(&account.id) {
                for user in users {
                    accounts_by_user.entry(*user).or_default().push(account);
                }
            }
        }

        let mut updated_users = Vec::new();
        let mut timelines_generated = 0;
        for user_id in &users_to_rebuild {
            let user_accounts = accounts_by_user.get(user_id).map(Vec::as_slice).unwrap_or(&[]);
            match self.rebuild_timeline(*user_id, user_accounts).await? {
                true => {
                    timelines_generated += 1;
                    updated_users.push(*user_id);
                }
                false => {
                    tracing::debug!(user_id = %user_id, "No usable snapshots, previous timeline preserved");
                }
            }
        }

        let result = CronResult {
            processed_accounts: accounts.len(),
            updated_users,
            failed_accounts,
            timelines_generated,
        };
        tracing::info!(
            processed_accounts = result.processed_accounts,
            failed_accounts = result.failed_accounts.len(),
            timelines_generated = result.timelines_generated,
            "Ingestion run settled"
        );
        Ok(result)
    }

    /// Gate, fetch, merge, store, and record the outcome for one account.
    async fn process_account(&self, account: &Account) -> AccountOutcome {
        let now = Utc::now();
        let mut state = match self.db.rate_state(account.id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(account_id = %account.id, error = %e, "Failed to load rate state");
                return AccountOutcome::Failed;
            }
        };

        if !self.policy.should_fetch(&state, now) {
            tracing::debug!(account_id = %account.id, platform = %account.platform, "Fetch gated");
            return AccountOutcome::Gated;
        }

        let token = match self.cipher.decrypt(&account.encrypted_access_token) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Token decryption failed");
                self.record_failure(account.id, &mut state, None).await;
                return AccountOutcome::Failed;
            }
        };

        let provider = match self.providers.get(account.platform) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "No provider registered");
                self.record_failure(account.id, &mut state, None).await;
                return AccountOutcome::Failed;
            }
        };

        match self.fetch_with_deadline(provider, &token).await {
            Ok(result) => {
                if let Err(e) = self.persist_payload(account, &result.payload).await {
                    tracing::error!(account_id = %account.id, error = %e, "Failed to persist payload");
                    self.record_failure(account.id, &mut state, None).await;
                    return AccountOutcome::Failed;
                }
                self.policy.update_on_success(&mut state, &result.rate);
                if let Err(e) = self.db.upsert_rate_state(account.id, &state).await {
                    tracing::error!(account_id = %account.id, error = %e, "Failed to record success");
                }
                if let Err(e) = self.db.touch_last_fetched(account.id, Utc::now()).await {
                    tracing::error!(account_id = %account.id, error = %e, "Failed to update last_fetched_at");
                }
                AccountOutcome::Success
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    platform = %account.platform,
                    error = %e,
                    "Provider fetch failed"
                );
                self.record_failure(account.id, &mut state, e.retry_after()).await;
                AccountOutcome::Failed
            }
        }
    }

    /// Run the provider under the per-adapter deadline. A deadline expiry is
    /// a provider failure; only external cancellation of the whole invocation
    /// leaves rate state untouched.
    async fn fetch_with_deadline(
        &self,
        provider: Arc<dyn Provider>,
        token: &str,
    ) -> Result<crate::providers::FetchResult, ProviderError> {
        match tokio::time::timeout(self.provider_timeout, provider.fetch(token)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Network {
                message: format!("fetch deadline ({:?}) exceeded", self.provider_timeout),
            }),
        }
    }

    async fn record_failure(
        &self,
        account_id: Uuid,
        state: &mut crate::ratelimit::RateState,
        retry_after: Option<Duration>,
    ) {
        self.policy.update_on_failure(state, retry_after, Utc::now());
        if let Err(e) = self.db.upsert_rate_state(account_id, state).await {
            tracing::error!(account_id = %account_id, error = %e, "Failed to record failure");
        }
    }

    /// Merge the payload with prior state (multi-store platforms), write the
    /// platform sub-stores, and write the composite raw snapshot.
    async fn persist_payload(
        &self,
        account: &Account,
        payload: &ProviderPayload,
    ) -> Result<(), StoreError> {
        let account_id = account.id;
        let tags = vec![
            format!("platform:{}", account.platform),
            format!("account:{}", account_id),
        ];
        let raw_store = StoreId::Raw { platform: account.platform, account_id };

        let merged: serde_json::Value = match payload {
            ProviderPayload::Github(incoming) => {
                let previous: GithubRaw = self
                    .latest_typed(&raw_store)
                    .await
                    .unwrap_or_default();

                let mut repos = previous.repos;
                for (full_name, data) in &incoming.repos {
                    let existing = repos.remove(full_name).unwrap_or_default();
                    let (commits, new_commits) =
                        merge::merge_commits(existing.commits, data.commits.clone());
                    let (prs, new_prs) = merge::merge_prs(existing.prs, data.prs.clone());
                    tracing::debug!(
                        account_id = %account_id,
                        repo = %full_name,
                        new_commits,
                        new_prs,
                        "Merged repository stores"
                    );

                    let (owner, name) = full_name.split_once('/').unwrap_or(("", full_name.as_str()));
                    let commits_store = StoreId::GithubCommits {
                        account_id,
                        owner: owner.to_string(),
                        repo: name.to_string(),
                    };
                    let prs_store = StoreId::GithubPrs {
                        account_id,
                        owner: owner.to_string(),
                        repo: name.to_string(),
                    };
                    self.snapshots
                        .put(&commits_store, &commits, PutOptions { tags: tags.clone(), parents: vec![] })
                        .await?;
                    self.snapshots
                        .put(&prs_store, &prs, PutOptions { tags: tags.clone(), parents: vec![] })
                        .await?;

                    repos.insert(full_name.clone(), GithubRepoData { commits, prs });
                }

                self.snapshots
                    .put(
                        &StoreId::GithubMeta { account_id },
                        &incoming.meta,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;

                serde_json::to_value(GithubRaw { meta: incoming.meta.clone(), repos })?
            }
            ProviderPayload::Reddit(incoming) => {
                let previous: RedditRaw = self.latest_typed(&raw_store).await.unwrap_or_default();

                let (posts, new_posts) =
                    merge::merge_posts(previous.posts, incoming.posts.clone());
                let (comments, new_comments) =
                    merge::merge_comments(previous.comments, incoming.comments.clone());
                tracing::debug!(account_id = %account_id, new_posts, new_comments, "Merged aggregator stores");

                self.snapshots
                    .put(
                        &StoreId::RedditMeta { account_id },
                        &incoming.meta,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;
                self.snapshots
                    .put(
                        &StoreId::RedditPosts { account_id },
                        &posts,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;
                self.snapshots
                    .put(
                        &StoreId::RedditComments { account_id },
                        &comments,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;

                serde_json::to_value(RedditRaw { meta: incoming.meta.clone(), posts, comments })?
            }
            ProviderPayload::Twitter(incoming) => {
                let previous: TwitterRaw = self.latest_typed(&raw_store).await.unwrap_or_default();

                let (tweets, new_tweets) =
                    merge::merge_tweets(previous.tweets, incoming.tweets.clone());
                tracing::debug!(account_id = %account_id, new_tweets, "Merged tweet store");

                self.snapshots
                    .put(
                        &StoreId::TwitterMeta { account_id },
                        &incoming.meta,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;
                self.snapshots
                    .put(
                        &StoreId::TwitterTweets { account_id },
                        &tweets,
                        PutOptions { tags: tags.clone(), parents: vec![] },
                    )
                    .await?;

                serde_json::to_value(TwitterRaw { meta: incoming.meta.clone(), tweets })?
            }
            // Single-raw platforms overwrite wholly.
            other => other.to_value()?,
        };

        self.snapshots
            .put(&raw_store, &merged, PutOptions { tags, parents: vec![] })
            .await?;
        Ok(())
    }

    /// Latest snapshot of a store deserialized into `T`; `None` when absent
    /// or when the stored shape no longer parses.
    async fn latest_typed<T: serde::de::DeserializeOwned>(&self, store_id: &StoreId) -> Option<T> {
        let snapshot = self.snapshots.get_latest(store_id).await.ok()??;
        serde_json::from_value(snapshot.data).ok()
    }

    /// Rebuild one user's timeline from the latest raw snapshot of each of
    /// their accounts. Returns false when there was nothing usable to build
    /// from, leaving the previous timeline untouched.
    async fn rebuild_timeline(
        &self,
        user_id: Uuid,
        accounts: &[&Account],
    ) -> Result<bool, IngestError> {
        let mut items = Vec::new();
        let mut parents = Vec::new();

        for account in accounts {
            let store_id = StoreId::Raw { platform: account.platform, account_id: account.id };
            let Some(snapshot) = self.snapshots.get_latest(&store_id).await? else {
                continue;
            };
            items.extend(normalize(account.platform, &snapshot.data));
            parents.push(ParentRef {
                store_id: snapshot.meta.store_id,
                version: snapshot.meta.version,
                role: Some(PARENT_ROLE_SOURCE.to_string()),
            });
        }

        if parents.is_empty() {
            return Ok(false);
        }

        let artifact = TimelineArtifact {
            user_id,
            generated_at: Utc::now(),
            groups: assemble(items),
        };
        self.snapshots
            .put(
                &StoreId::Timeline { user_id },
                &artifact,
                PutOptions { tags: vec![format!("user:{}", user_id)], parents },
            )
            .await?;
        Ok(true)
    }

    // ── Exposed reads and deletion ───────────────────────────────────────

    /// The most recent timeline artifact for a user.
    pub async fn get_latest_timeline(
        &self,
        user_id: Uuid,
    ) -> Result<Option<TimelineArtifact>, IngestError> {
        let Some(snapshot) = self.snapshots.get_latest(&StoreId::Timeline { user_id }).await?
        else {
            return Ok(None);
        };
        match serde_json::from_value(snapshot.data) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Stored timeline failed to parse");
                Ok(None)
            }
        }
    }

    /// The most recent raw snapshot for an account.
    pub async fn get_latest_raw(
        &self,
        platform: Platform,
        account_id: Uuid,
    ) -> Result<Option<Snapshot>, IngestError> {
        Ok(self
            .snapshots
            .get_latest(&StoreId::Raw { platform, account_id })
            .await?)
    }

    /// Remove an account: memberships, the account row, and every snapshot
    /// store in the account's namespace.
    pub async fn delete_account(&self, account_id: Uuid) -> Result<DeleteSummary, IngestError> {
        let affected_users = self.db.delete_account(account_id).await?;

        let mut deleted_stores = 0;
        for raw_id in self.snapshots.store_ids().await? {
            let parsed = match StoreId::parse(&raw_id) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!(store_id = %raw_id, error = %e, "Unparseable store id, skipping");
                    continue;
                }
            };
            if parsed.owner_account() == Some(account_id) {
                self.snapshots.delete_store(&parsed).await?;
                deleted_stores += 1;
            }
        }

        tracing::info!(
            account_id = %account_id,
            deleted_stores,
            affected_users = affected_users.len(),
            "Account deleted"
        );
        Ok(DeleteSummary { deleted_stores, affected_users })
    }
}

/// Per-account per-invocation lifecycle result. `Gated` is terminal for the
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountOutcome {
    Gated,
    Success,
    Failed,
}
