//! Relational store.
//!
//! SQLite via `rusqlite` behind an async mutex. The engine reads accounts and
//! memberships (written by the external OAuth flow), upserts rate-limit rows,
//! maintains the snapshot manifest (`corpus_snapshots`) and parent edges
//! (`corpus_parents`), and updates `last_fetched_at` on accounts.

use crate::models::{Account, AccountMember, MemberRole, Platform};
use crate::ratelimit::RateState;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    platform TEXT NOT NULL,
    platform_user_id TEXT,
    platform_username TEXT,
    encrypted_access_token TEXT NOT NULL,
    encrypted_refresh_token TEXT,
    token_expires_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_fetched_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_active ON accounts(is_active);

CREATE TABLE IF NOT EXISTS account_members (
    user_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'member',
    PRIMARY KEY (user_id, account_id),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_account ON account_members(account_id);

CREATE TABLE IF NOT EXISTS rate_limits (
    account_id TEXT PRIMARY KEY NOT NULL,
    remaining INTEGER,
    limit_total INTEGER,
    reset_at TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    last_failure_at TEXT,
    circuit_open_until TEXT,
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS corpus_snapshots (
    store_id TEXT NOT NULL,
    version TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT,
    PRIMARY KEY (store_id, version)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_store_created
    ON corpus_snapshots(store_id, created_at DESC);

CREATE TABLE IF NOT EXISTS corpus_parents (
    child_store_id TEXT NOT NULL,
    child_version TEXT NOT NULL,
    parent_store_id TEXT NOT NULL,
    parent_version TEXT NOT NULL,
    role TEXT,
    FOREIGN KEY (child_store_id, child_version)
        REFERENCES corpus_snapshots(store_id, version) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_parents_child
    ON corpus_parents(child_store_id, child_version);
CREATE INDEX IF NOT EXISTS idx_parents_parent
    ON corpus_parents(parent_store_id, parent_version);
"#;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

/// A directed reference from a derived snapshot to a source snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub store_id: String,
    pub version: Uuid,
    pub role: Option<String>,
}

/// Manifest row for one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub store_id: String,
    pub version: Uuid,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub parents: Vec<ParentRef>,
}

fn parse_rfc3339(raw: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::CorruptRow {
            table,
            detail: format!("bad timestamp {:?}: {}", raw, e),
        })
}

fn parse_uuid(raw: &str, table: &'static str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::CorruptRow {
        table,
        detail: format!("bad uuid {:?}: {}", raw, e),
    })
}

fn opt_rfc3339(raw: Option<String>, table: &'static str) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(|s| parse_rfc3339(&s, table)).transpose()
}

/// An `accounts` row as stored, before validation. Parsed into an
/// [`Account`] separately so corruption surfaces as `DbError::CorruptRow`
/// rather than a silent guess.
type RawAccountRow = (
    String,         // id
    String,         // platform
    Option<String>, // platform_user_id
    Option<String>, // platform_username
    String,         // encrypted_access_token
    Option<String>, // encrypted_refresh_token
    Option<String>, // token_expires_at
    i64,            // is_active
    Option<String>, // last_fetched_at
    String,         // created_at
    String,         // updated_at
);

/// Shared connection handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    // ── Accounts and memberships ─────────────────────────────────────────

    fn account_row(row: &rusqlite::Row<'_>) -> Result<RawAccountRow, rusqlite::Error> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
        ))
    }

    fn build_account(raw: RawAccountRow) -> Result<Account, DbError> {
        let (
            id,
            platform,
            platform_user_id,
            platform_username,
            encrypted_access_token,
            encrypted_refresh_token,
            token_expires_at,
            is_active,
            last_fetched_at,
            created_at,
            updated_at,
        ) = raw;

        // A corrupted platform must never fall back to some default: the
        // scheduler would fetch with the wrong adapter for this account's
        // token.
        let platform = Platform::parse(&platform).ok_or_else(|| DbError::CorruptRow {
            table: "accounts",
            detail: format!("unknown platform {:?}", platform),
        })?;

        Ok(Account {
            id: parse_uuid(&id, "accounts")?,
            platform,
            platform_user_id,
            platform_username,
            encrypted_access_token,
            encrypted_refresh_token,
            token_expires_at: opt_rfc3339(token_expires_at, "accounts")?,
            is_active: is_active != 0,
            last_fetched_at: opt_rfc3339(last_fetched_at, "accounts")?,
            created_at: parse_rfc3339(&created_at, "accounts")?,
            updated_at: parse_rfc3339(&updated_at, "accounts")?,
        })
    }

    const ACCOUNT_COLUMNS: &'static str = "id, platform, platform_user_id, platform_username, \
         encrypted_access_token, encrypted_refresh_token, token_expires_at, \
         is_active, last_fetched_at, created_at, updated_at";

    /// All active accounts, any membership.
    pub async fn active_accounts(&self) -> Result<Vec<Account>, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE is_active = 1 ORDER BY created_at",
            Self::ACCOUNT_COLUMNS
        ))?;
        let raws: Vec<RawAccountRow> = stmt
            .query_map([], Self::account_row)?
            .collect::<Result<_, _>>()?;
        raws.into_iter().map(Self::build_account).collect()
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE id = ?1",
            Self::ACCOUNT_COLUMNS
        ))?;
        let raw = stmt
            .query_row(params![id.to_string()], Self::account_row)
            .optional()?;
        raw.map(Self::build_account).transpose()
    }

    /// Insert an account row. The OAuth flow owns this normally; the engine
    /// exposes it for tests and tooling.
    pub async fn insert_account(&self, account: &Account) -> Result<(), DbError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO accounts (id, platform, platform_user_id, platform_username, \
             encrypted_access_token, encrypted_refresh_token, token_expires_at, \
             is_active, last_fetched_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                account.id.to_string(),
                account.platform.as_str(),
                account.platform_user_id,
                account.platform_username,
                account.encrypted_access_token,
                account.encrypted_refresh_token,
                account.token_expires_at.map(|t| t.to_rfc3339()),
                account.is_active as i64,
                account.last_fetched_at.map(|t| t.to_rfc3339()),
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn insert_member(&self, member: &AccountMember) -> Result<(), DbError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO account_members (user_id, account_id, role) VALUES (?1, ?2, ?3)",
            params![
                member.user_id.to_string(),
                member.account_id.to_string(),
                member.role.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Members of one account.
    pub async fn members_of(&self, account_id: Uuid) -> Result<Vec<AccountMember>, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT user_id, account_id, role FROM account_members WHERE account_id = ?1",
        )?;
        let rows = stmt.query_map(params![account_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut members = Vec::new();
        for row in rows {
            let (user_id, account_id, role) = row?;
            members.push(AccountMember {
                user_id: parse_uuid(&user_id, "account_members")?,
                account_id: parse_uuid(&account_id, "account_members")?,
                role: MemberRole::parse(&role).ok_or_else(|| DbError::CorruptRow {
                    table: "account_members",
                    detail: format!("bad role {:?}", role),
                })?,
            });
        }
        Ok(members)
    }

    pub async fn touch_last_fetched(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE accounts SET last_fetched_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![account_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete an account row and its memberships. Returns affected user ids.
    pub async fn delete_account(&self, account_id: Uuid) -> Result<Vec<Uuid>, DbError> {
        let members = self.members_of(account_id).await?;
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM account_members WHERE account_id = ?1",
            params![account_id.to_string()],
        )?;
        conn.execute(
            "DELETE FROM rate_limits WHERE account_id = ?1",
            params![account_id.to_string()],
        )?;
        conn.execute(
            "DELETE FROM accounts WHERE id = ?1",
            params![account_id.to_string()],
        )?;
        Ok(members.into_iter().map(|m| m.user_id).collect())
    }

    // ── Rate limits ──────────────────────────────────────────────────────

    pub async fn rate_state(&self, account_id: Uuid) -> Result<RateState, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT remaining, limit_total, reset_at, consecutive_failures, \
             last_failure_at, circuit_open_until FROM rate_limits WHERE account_id = ?1",
        )?;
        let row = stmt
            .query_row(params![account_id.to_string()], |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .optional()?;

        match row {
            None => Ok(RateState::default()),
            Some((remaining, limit_total, reset_at, failures, last_failure, circuit)) => {
                Ok(RateState {
                    remaining,
                    limit_total,
                    reset_at: opt_rfc3339(reset_at, "rate_limits")?,
                    consecutive_failures: failures.max(0) as u32,
                    last_failure_at: opt_rfc3339(last_failure, "rate_limits")?,
                    circuit_open_until: opt_rfc3339(circuit, "rate_limits")?,
                })
            }
        }
    }

    pub async fn upsert_rate_state(
        &self,
        account_id: Uuid,
        state: &RateState,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO rate_limits (account_id, remaining, limit_total, reset_at, \
             consecutive_failures, last_failure_at, circuit_open_until) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (account_id) DO UPDATE SET \
             remaining = excluded.remaining, \
             limit_total = excluded.limit_total, \
             reset_at = excluded.reset_at, \
             consecutive_failures = excluded.consecutive_failures, \
             last_failure_at = excluded.last_failure_at, \
             circuit_open_until = excluded.circuit_open_until",
            params![
                account_id.to_string(),
                state.remaining,
                state.limit_total,
                state.reset_at.map(|t| t.to_rfc3339()),
                state.consecutive_failures as i64,
                state.last_failure_at.map(|t| t.to_rfc3339()),
                state.circuit_open_until.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    // ── Snapshot manifest ────────────────────────────────────────────────

    /// Record a snapshot manifest row and its parent edges in one
    /// transaction. The blob must already be durable; the row appearing is
    /// what makes the snapshot visible to readers.
    pub async fn insert_snapshot(
        &self,
        store_id: &str,
        version: Uuid,
        content_hash: &str,
        created_at: DateTime<Utc>,
        tags: &[String],
        parents: &[ParentRef],
    ) -> Result<(), DbError> {
        let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO corpus_snapshots (store_id, version, content_hash, created_at, tags) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                store_id,
                version.to_string(),
                content_hash,
                created_at.to_rfc3339(),
                tags_json,
            ],
        )?;
        for parent in parents {
            tx.execute(
                "INSERT INTO corpus_parents \
                 (child_store_id, child_version, parent_store_id, parent_version, role) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    store_id,
                    version.to_string(),
                    parent.store_id,
                    parent.version.to_string(),
                    parent.role,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn meta_from_row(row: &rusqlite::Row<'_>) -> Result<(String, String, String, String, String), rusqlite::Error> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    fn build_meta(
        &self,
        conn: &Connection,
        raw: (String, String, String, String, String),
    ) -> Result<SnapshotMeta, DbError> {
        let (store_id, version, content_hash, created_at, tags_json) = raw;
        let version = parse_uuid(&version, "corpus_snapshots")?;
        let created_at = parse_rfc3339(&created_at, "corpus_snapshots")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        let mut stmt = conn.prepare(
            "SELECT parent_store_id, parent_version, role FROM corpus_parents \
             WHERE child_store_id = ?1 AND child_version = ?2",
        )?;
        let rows = stmt.query_map(params![store_id, version.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut parents = Vec::new();
        for row in rows {
            let (parent_store, parent_version, role) = row?;
            parents.push(ParentRef {
                store_id: parent_store,
                version: parse_uuid(&parent_version, "corpus_parents")?,
                role,
            });
        }

        Ok(SnapshotMeta { store_id, version, content_hash, created_at, tags, parents })
    }

    /// Latest manifest row for a store. Ordered by `created_at` with the
    /// rowid as tiebreaker so equal-timestamp writes stay linearizable.
    pub async fn latest_snapshot(&self, store_id: &str) -> Result<Option<SnapshotMeta>, DbError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT store_id, version, content_hash, created_at, tags \
                 FROM corpus_snapshots WHERE store_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![store_id],
                Self::meta_from_row,
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(self.build_meta(&conn, raw)?)),
        }
    }

    pub async fn snapshot(
        &self,
        store_id: &str,
        version: Uuid,
    ) -> Result<Option<SnapshotMeta>, DbError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT store_id, version, content_hash, created_at, tags \
                 FROM corpus_snapshots WHERE store_id = ?1 AND version = ?2",
                params![store_id, version.to_string()],
                Self::meta_from_row,
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(self.build_meta(&conn, raw)?)),
        }
    }

    /// All manifest rows for a store, descending `created_at`.
    pub async fn list_snapshots(&self, store_id: &str) -> Result<Vec<SnapshotMeta>, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT store_id, version, content_hash, created_at, tags \
             FROM corpus_snapshots WHERE store_id = ?1 \
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let raws: Vec<_> = stmt
            .query_map(params![store_id], Self::meta_from_row)?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        raws.into_iter().map(|raw| self.build_meta(&conn, raw)).collect()
    }

    /// Every distinct store id present in the manifest.
    pub async fn list_store_ids(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT DISTINCT store_id FROM corpus_snapshots")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete all manifest rows for a store plus any parent edges referencing
    /// it from other stores. Returns the deleted versions so the caller can
    /// remove the blobs.
    pub async fn delete_store(&self, store_id: &str) -> Result<Vec<Uuid>, DbError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let versions: Vec<Uuid> = {
            let mut stmt =
                tx.prepare("SELECT version FROM corpus_snapshots WHERE store_id = ?1")?;
            let rows = stmt.query_map(params![store_id], |row| row.get::<_, String>(0))?;
            let mut versions = Vec::new();
            for row in rows {
                versions.push(parse_uuid(&row?, "corpus_snapshots")?);
            }
            versions
        };
        tx.execute(
            "DELETE FROM corpus_parents WHERE child_store_id = ?1 OR parent_store_id = ?1",
            params![store_id],
        )?;
        tx.execute(
            "DELETE FROM corpus_snapshots WHERE store_id = ?1",
            params![store_id],
        )?;
        tx.commit()?;
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account(platform: Platform) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            platform,
            platform_user_id: Some("u-1".into()),
            platform_username: Some("octo".into()),
            encrypted_access_token: "ciphertext".into(),
            encrypted_refresh_token: None,
            token_expires_at: None,
            is_active: true,
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn account_membership_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let account = test_account(Platform::Github);
        db.insert_account(&account).await.unwrap();

        let user = Uuid::new_v4();
        db.insert_member(&AccountMember {
            user_id: user,
            account_id: account.id,
            role: MemberRole::Owner,
        })
        .await
        .unwrap();

        let accounts = db.active_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, account.id);

        let members = db.members_of(account.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, user);
        assert_eq!(members[0].role, MemberRole::Owner);
    }

    #[tokio::test]
    async fn corrupt_account_row_surfaces_error() {
        let db = Database::open_in_memory().unwrap();
        let account = test_account(Platform::Twitter);
        db.insert_account(&account).await.unwrap();

        {
            let conn = db.conn.lock().await;
            conn.execute("UPDATE accounts SET platform = 'myspace'", [])
                .unwrap();
        }

        // A corrupted platform column must not be reinterpreted as some
        // other provider.
        let err = db.active_accounts().await.unwrap_err();
        assert!(matches!(err, DbError::CorruptRow { table: "accounts", .. }));

        {
            let conn = db.conn.lock().await;
            conn.execute(
                "UPDATE accounts SET platform = 'twitter', id = 'not-a-uuid'",
                [],
            )
            .unwrap();
        }
        let err = db.active_accounts().await.unwrap_err();
        assert!(matches!(err, DbError::CorruptRow { table: "accounts", .. }));
    }

    #[tokio::test]
    async fn duplicate_membership_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let account = test_account(Platform::Github);
        db.insert_account(&account).await.unwrap();

        let member = AccountMember {
            user_id: Uuid::new_v4(),
            account_id: account.id,
            role: MemberRole::Member,
        };
        db.insert_member(&member).await.unwrap();
        assert!(db.insert_member(&member).await.is_err());
    }

    #[tokio::test]
    async fn rate_state_upsert_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let account = test_account(Platform::Reddit);
        db.insert_account(&account).await.unwrap();

        // Absent row reads as default.
        let fresh = db.rate_state(account.id).await.unwrap();
        assert_eq!(fresh, RateState::default());

        let state = RateState {
            remaining: Some(0),
            limit_total: Some(60),
            reset_at: Some(Utc::now()),
            consecutive_failures: 2,
            last_failure_at: Some(Utc::now()),
            circuit_open_until: None,
        };
        db.upsert_rate_state(account.id, &state).await.unwrap();
        let loaded = db.rate_state(account.id).await.unwrap();
        assert_eq!(loaded.remaining, Some(0));
        assert_eq!(loaded.consecutive_failures, 2);

        // Second upsert overwrites.
        let mut cleared = loaded;
        cleared.consecutive_failures = 0;
        cleared.remaining = Some(59);
        db.upsert_rate_state(account.id, &cleared).await.unwrap();
        assert_eq!(db.rate_state(account.id).await.unwrap().remaining, Some(59));
    }

    #[tokio::test]
    async fn snapshot_manifest_ordering_and_parents() {
        let db = Database::open_in_memory().unwrap();
        let v1 = Uuid::now_v7();
        let v2 = Uuid::now_v7();
        let t = Utc::now();

        db.insert_snapshot("raw/github/x", v1, "hash-1", t, &["platform:github".into()], &[])
            .await
            .unwrap();
        db.insert_snapshot(
            "timeline/u",
            v2,
            "hash-2",
            t,
            &[],
            &[ParentRef {
                store_id: "raw/github/x".into(),
                version: v1,
                role: Some("source".into()),
            }],
        )
        .await
        .unwrap();

        let latest = db.latest_snapshot("timeline/u").await.unwrap().unwrap();
        assert_eq!(latest.version, v2);
        assert_eq!(latest.parents.len(), 1);
        assert_eq!(latest.parents[0].store_id, "raw/github/x");
        assert_eq!(latest.parents[0].role.as_deref(), Some("source"));

        // Same created_at: rowid breaks the tie toward the later insert.
        let v3 = Uuid::now_v7();
        db.insert_snapshot("timeline/u", v3, "hash-3", t, &[], &[])
            .await
            .unwrap();
        assert_eq!(
            db.latest_snapshot("timeline/u").await.unwrap().unwrap().version,
            v3
        );
    }

    #[tokio::test]
    async fn delete_store_removes_rows_and_edges() {
        let db = Database::open_in_memory().unwrap();
        let v1 = Uuid::now_v7();
        let v2 = Uuid::now_v7();
        let t = Utc::now();

        db.insert_snapshot("raw/github/x", v1, "h1", t, &[], &[])
            .await
            .unwrap();
        db.insert_snapshot(
            "timeline/u",
            v2,
            "h2",
            t,
            &[],
            &[ParentRef { store_id: "raw/github/x".into(), version: v1, role: None }],
        )
        .await
        .unwrap();

        let deleted = db.delete_store("raw/github/x").await.unwrap();
        assert_eq!(deleted, vec![v1]);
        assert!(db.latest_snapshot("raw/github/x").await.unwrap().is_none());

        // The timeline row survives but its dangling edge is gone.
        let timeline = db.latest_snapshot("timeline/u").await.unwrap().unwrap();
        assert!(timeline.parents.is_empty());
    }
}
