// Snapshot policy and the save/revert flows built on top of it.
//
// Every destructive write is preceded by a snapshot of the content it
// replaces. The snapshot is taken before the write and a snapshot
// failure aborts the whole save, so the stored history never has a gap
// in front of an overwrite.

use chrono::SecondsFormat;
use coedit_common::types::FileId;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::{FileRecord, FileStore, StorageError, VersionRecord, VersionStore};

/// Description attached to the automatic snapshot taken before a save.
pub const AUTO_SNAPSHOT_DESCRIPTION: &str = "Auto-snapshot before save";

/// Decides whether a write must be preceded by a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotPolicy;

impl SnapshotPolicy {
    /// A snapshot is required when the write would replace existing
    /// content with something different. First writes have nothing to
    /// protect, and no-op writes destroy nothing.
    pub fn should_snapshot(self, previous: Option<&str>, next: &str) -> bool {
        previous.is_some_and(|existing| existing != next)
    }
}

#[derive(Debug, Error)]
pub enum VersioningError {
    #[error("file not found: {0}")]
    FileNotFound(FileId),
    #[error("version not found: {0}")]
    VersionNotFound(Uuid),
    #[error("pre-write snapshot failed, save aborted")]
    SnapshotWriteFailed(#[source] StorageError),
    #[error("file content could not be written")]
    WriteFailed(#[source] StorageError),
    #[error("revert could not replace the file content")]
    RevertFailed(#[source] StorageError),
}

/// Result of a save: the new file record, the pre-write snapshot if the
/// policy required one, and whether the file was created by this save.
#[derive(Debug)]
pub struct SaveOutcome {
    pub record: FileRecord,
    pub snapshot: Option<VersionRecord>,
    pub created: bool,
}

#[derive(Debug)]
pub struct RevertOutcome {
    pub record: FileRecord,
    pub safety_snapshot: VersionRecord,
    pub reverted_to: VersionRecord,
}

/// Coordinates the file store, version store and snapshot policy.
#[derive(Debug, Clone)]
pub struct Versioning {
    files: FileStore,
    versions: VersionStore,
    policy: SnapshotPolicy,
}

impl Versioning {
    pub fn new(files: FileStore, versions: VersionStore) -> Self {
        Self { files, versions, policy: SnapshotPolicy }
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Persists `content` for `file_id`, snapshotting the replaced
    /// content first when the policy demands it. The snapshot happens
    /// before the write; if it fails the file is left untouched.
    pub async fn save_file(
        &self,
        file_id: &FileId,
        content: &str,
        author: &str,
    ) -> Result<SaveOutcome, VersioningError> {
        let previous = match self.files.read(file_id).await {
            Ok(record) => Some(record.content),
            Err(StorageError::FileNotFound(_)) => None,
            Err(err) => return Err(VersioningError::WriteFailed(err)),
        };

        let snapshot = if self.policy.should_snapshot(previous.as_deref(), content) {
            let replaced = previous.as_deref().unwrap_or_default();
            let snapshot = self
                .versions
                .create_snapshot(file_id, replaced, AUTO_SNAPSHOT_DESCRIPTION, author)
                .await
                .map_err(|err| {
                    warn!(file_id = %file_id, error = %err, "pre-write snapshot failed, aborting save");
                    VersioningError::SnapshotWriteFailed(err)
                })?;
            Some(snapshot)
        } else {
            None
        };

        let created = previous.is_none();
        let outcome = self
            .files
            .write(file_id, content, author)
            .await
            .map_err(VersioningError::WriteFailed)?;

        info!(
            file_id = %file_id,
            created,
            snapshotted = snapshot.is_some(),
            "file saved"
        );
        Ok(SaveOutcome { record: outcome.record, snapshot, created })
    }

    /// Replaces the file's content with a historical snapshot, after
    /// snapshotting the current content so the revert itself is
    /// reversible.
    pub async fn revert_file(
        &self,
        version_id: Uuid,
        author: &str,
    ) -> Result<RevertOutcome, VersioningError> {
        let target = match self.versions.get(version_id).await {
            Ok(record) => record,
            Err(StorageError::VersionNotFound(id)) => {
                return Err(VersioningError::VersionNotFound(id))
            }
            Err(err) => return Err(VersioningError::RevertFailed(err)),
        };

        let current = match self.files.read(&target.file_id).await {
            Ok(record) => record,
            Err(StorageError::FileNotFound(id)) => {
                return Err(VersioningError::FileNotFound(id))
            }
            Err(err) => return Err(VersioningError::RevertFailed(err)),
        };

        let description = format!(
            "Auto-save before revert to {}",
            target.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let safety_snapshot = self
            .versions
            .create_snapshot(&target.file_id, &current.content, &description, author)
            .await
            .map_err(|err| {
                warn!(version_id = %version_id, error = %err, "safety snapshot failed, aborting revert");
                VersioningError::RevertFailed(err)
            })?;

        let outcome = self
            .files
            .write(&target.file_id, &target.content, author)
            .await
            .map_err(|err| {
                warn!(version_id = %version_id, error = %err, "revert write failed");
                VersioningError::RevertFailed(err)
            })?;

        info!(
            file_id = %target.file_id,
            version_id = %version_id,
            "file reverted to snapshot"
        );
        Ok(RevertOutcome { record: outcome.record, safety_snapshot, reverted_to: target })
    }
}
