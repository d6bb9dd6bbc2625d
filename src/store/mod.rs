//! Versioned object store with pluggable blob backends.
//!
//! Snapshots are append-only and content-addressed: each `put` serializes the
//! payload, hashes it with SHA-256, assigns a new time-ordered version id,
//! writes the blob, then records the manifest row and parent edges. Duplicate
//! content is permitted; callers compare `content_hash` to detect it.
//!
//! Backends:
//! - `memory`: in-memory blobs (non-persistent, for testing)
//! - `fs`: one file per blob under a root directory

pub mod ids;

pub use ids::{StoreId, StoreIdError};

use crate::db::{Database, DbError, ParentRef, SnapshotMeta};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Blob backend error: {0}")]
    Blob(String),

    #[error("Blob missing for {store_id} version {version}")]
    MissingBlob { store_id: String, version: Uuid },

    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value blob backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Keys beginning with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory blob backend (non-persistent).
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Filesystem blob backend. Keys are `/`-delimited store paths; each
/// component maps to a directory level under `root`.
#[derive(Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in key.split('/') {
            path.push(sanitize_component(component));
        }
        path
    }
}

/// Keep only filesystem-safe characters in a key component.
fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Blob(e.to_string())),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Blob(e.to_string()))?;
        }
        // Write then rename so a concurrent reader never sees a torn blob.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Blob(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Walk the tree and reconstruct keys relative to the root.
        fn walk(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<String>) {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => return,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else if let Ok(rel) = path.strip_prefix(root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(key);
                }
            }
        }

        let root = self.root.clone();
        let prefix = prefix.to_string();
        let keys = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk(&root, &root, &mut out);
            out.retain(|k| k.starts_with(&prefix));
            out
        })
        .await
        .map_err(|e| StoreError::Blob(e.to_string()))?;
        Ok(keys)
    }
}

/// Result of a `put`: the assigned version and the payload's content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub version: Uuid,
    pub content_hash: String,
}

/// Options for a `put`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub tags: Vec<String>,
    pub parents: Vec<ParentRef>,
}

/// A snapshot read back from the store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub data: serde_json::Value,
}

/// The versioned object store: manifest rows in the relational store, payload
/// bodies in a blob backend.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
    blobs: Arc<dyn BlobStore>,
}

fn blob_key(store_id: &str, version: Uuid) -> String {
    format!("{}/{}", store_id, version)
}

impl SnapshotStore {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Serialize, hash, and persist a payload as a new version of `store_id`.
    ///
    /// The blob is written before the manifest row so a version is never
    /// visible without its body. Byte-identical payloads produce equal
    /// `content_hash` but distinct versions.
    pub async fn put<T: Serialize>(
        &self,
        store_id: &StoreId,
        payload: &T,
        options: PutOptions,
    ) -> Result<PutResult, StoreError> {
        let bytes = serde_json::to_vec(payload)?;
        let content_hash = hex::encode(Sha256::digest(&bytes));
        let version = Uuid::now_v7();
        let store_key = store_id.to_string();

        self.blobs.put(&blob_key(&store_key, version), &bytes).await?;
        self.db
            .insert_snapshot(
                &store_key,
                version,
                &content_hash,
                Utc::now(),
                &options.tags,
                &options.parents,
            )
            .await?;

        tracing::debug!(
            store_id = %store_key,
            version = %version,
            content_hash = %content_hash,
            "Snapshot written"
        );
        Ok(PutResult { version, content_hash })
    }

    async fn read_body(&self, meta: SnapshotMeta) -> Result<Snapshot, StoreError> {
        let key = blob_key(&meta.store_id, meta.version);
        let bytes = self.blobs.get(&key).await?.ok_or_else(|| StoreError::MissingBlob {
            store_id: meta.store_id.clone(),
            version: meta.version,
        })?;
        let data = serde_json::from_slice(&bytes)?;
        Ok(Snapshot { meta, data })
    }

    /// A specific version of a store.
    pub async fn get(
        &self,
        store_id: &StoreId,
        version: Uuid,
    ) -> Result<Option<Snapshot>, StoreError> {
        match self.db.snapshot(&store_id.to_string(), version).await? {
            None => Ok(None),
            Some(meta) => Ok(Some(self.read_body(meta).await?)),
        }
    }

    /// The most recent successful `put` for a store.
    pub async fn get_latest(&self, store_id: &StoreId) -> Result<Option<Snapshot>, StoreError> {
        match self.db.latest_snapshot(&store_id.to_string()).await? {
            None => Ok(None),
            Some(meta) => Ok(Some(self.read_body(meta).await?)),
        }
    }

    /// Manifest rows for a store, descending `created_at`.
    pub async fn list(&self, store_id: &StoreId) -> Result<Vec<SnapshotMeta>, StoreError> {
        Ok(self.db.list_snapshots(&store_id.to_string()).await?)
    }

    /// Every distinct store id in the manifest.
    pub async fn store_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.db.list_store_ids().await?)
    }

    /// Cascading delete of a store: manifest rows, parent edges referencing
    /// it, and blobs. Returns the number of snapshots removed.
    pub async fn delete_store(&self, store_id: &StoreId) -> Result<usize, StoreError> {
        let store_key = store_id.to_string();
        let versions = self.db.delete_store(&store_key).await?;
        for version in &versions {
            self.blobs.delete(&blob_key(&store_key, *version)).await?;
        }
        Ok(versions.len())
    }
}
