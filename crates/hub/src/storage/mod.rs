// In-memory stores backing the file and version HTTP surface.
//
// The hub owns content and version history for the lifetime of the
// process; durable persistence lives in a separate service. Both stores
// are enums so tests can swap in failing variants and exercise the
// snapshot-failure paths without touching the memory-backed code.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coedit_common::types::FileId;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    FileNotFound(FileId),
    #[error("version not found: {0}")]
    VersionNotFound(Uuid),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Current content of one file, as the hub last saw it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileRecord {
    pub file_id: FileId,
    pub content: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable snapshot of a file's content.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VersionRecord {
    pub version_id: Uuid,
    pub file_id: FileId,
    pub content: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a file write: the record now stored, plus whatever content
/// the write replaced.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub previous: Option<String>,
    pub record: FileRecord,
}

#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: RwLock<HashMap<FileId, FileRecord>>,
}

/// Store for current file content.
#[derive(Debug, Clone)]
pub enum FileStore {
    Memory(Arc<MemoryFiles>),
    /// Reads succeed against the wrapped store, writes fail. Lets tests
    /// drive the revert path into its replace-content failure.
    #[cfg(test)]
    ReadOnly(Arc<MemoryFiles>),
}

impl FileStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(MemoryFiles::default()))
    }

    #[cfg(test)]
    pub fn read_only_for_tests() -> Self {
        Self::ReadOnly(Arc::new(MemoryFiles::default()))
    }

    pub async fn read(&self, file_id: &FileId) -> Result<FileRecord, StorageError> {
        let inner = self.inner();
        let files = inner.files.read().await;
        files
            .get(file_id)
            .cloned()
            .ok_or_else(|| StorageError::FileNotFound(file_id.clone()))
    }

    pub async fn exists(&self, file_id: &FileId) -> bool {
        self.inner().files.read().await.contains_key(file_id)
    }

    /// Replaces the stored content for `file_id`, creating the record if
    /// it does not exist yet.
    pub async fn write(
        &self,
        file_id: &FileId,
        content: &str,
        author: &str,
    ) -> Result<WriteOutcome, StorageError> {
        match self {
            Self::Memory(inner) => {
                let mut files = inner.files.write().await;
                let previous = files.get(file_id).map(|record| record.content.clone());
                let created_at =
                    files.get(file_id).map(|record| record.created_at).unwrap_or_else(Utc::now);
                let record = FileRecord {
                    file_id: file_id.clone(),
                    content: content.to_owned(),
                    updated_by: author.to_owned(),
                    created_at,
                    updated_at: Utc::now(),
                };
                files.insert(file_id.clone(), record.clone());
                Ok(WriteOutcome { previous, record })
            }
            #[cfg(test)]
            Self::ReadOnly(_) => {
                Err(StorageError::Unavailable("file store is read-only".to_owned()))
            }
        }
    }

    #[cfg(test)]
    pub async fn seed(&self, file_id: &FileId, content: &str) {
        let record = FileRecord {
            file_id: file_id.clone(),
            content: content.to_owned(),
            updated_by: "seed".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.inner().files.write().await.insert(file_id.clone(), record);
    }

    fn inner(&self) -> &MemoryFiles {
        match self {
            Self::Memory(inner) => inner,
            #[cfg(test)]
            Self::ReadOnly(inner) => inner,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryVersions {
    versions: RwLock<Vec<VersionRecord>>,
}

/// Store for immutable version snapshots.
#[derive(Debug, Clone)]
pub enum VersionStore {
    Memory(Arc<MemoryVersions>),
    /// Every write fails. Lets tests drive the pre-write snapshot into
    /// failure and assert the save is aborted.
    #[cfg(test)]
    Failing,
}

impl VersionStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(MemoryVersions::default()))
    }

    #[cfg(test)]
    pub fn failing_for_tests() -> Self {
        Self::Failing
    }

    pub async fn create_snapshot(
        &self,
        file_id: &FileId,
        content: &str,
        description: &str,
        created_by: &str,
    ) -> Result<VersionRecord, StorageError> {
        match self {
            Self::Memory(inner) => {
                let record = VersionRecord {
                    version_id: Uuid::new_v4(),
                    file_id: file_id.clone(),
                    content: content.to_owned(),
                    description: description.to_owned(),
                    created_by: created_by.to_owned(),
                    created_at: Utc::now(),
                };
                inner.versions.write().await.push(record.clone());
                Ok(record)
            }
            #[cfg(test)]
            Self::Failing => {
                Err(StorageError::Unavailable("version store is unavailable".to_owned()))
            }
        }
    }

    /// All snapshots of one file, newest first.
    pub async fn list_snapshots(&self, file_id: &FileId) -> Vec<VersionRecord> {
        match self {
            Self::Memory(inner) => {
                let versions = inner.versions.read().await;
                let mut matching = versions
                    .iter()
                    .filter(|record| record.file_id == *file_id)
                    .cloned()
                    .collect::<Vec<_>>();
                matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                matching
            }
            #[cfg(test)]
            Self::Failing => Vec::new(),
        }
    }

    pub async fn get(&self, version_id: Uuid) -> Result<VersionRecord, StorageError> {
        match self {
            Self::Memory(inner) => {
                let versions = inner.versions.read().await;
                versions
                    .iter()
                    .find(|record| record.version_id == version_id)
                    .cloned()
                    .ok_or(StorageError::VersionNotFound(version_id))
            }
            #[cfg(test)]
            Self::Failing => Err(StorageError::VersionNotFound(version_id)),
        }
    }
}
