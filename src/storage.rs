//! # Persistence Collaborator
//!
//! On-disk persistence is reduced to a key/blob contract: `write`, `read`,
//! `exists`. The wallet ledger is the only core consumer; it always reads and
//! writes the full document, never partial updates.

use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key not found: {0}")]
    NotFound(String),
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()>;
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// File-per-key storage rooted at a directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(key), blob).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// In-memory storage, used by tests and as a fallback when no data
/// directory is configured.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        self.entries.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.entries
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.contains_key(key))
    }
}
