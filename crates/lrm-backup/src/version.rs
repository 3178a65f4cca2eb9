//! Backup version records and the per-file manifest.

use crate::error::{BackupError, BackupResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation label of the safeguard backup taken before a restore.
pub const PRE_RESTORE_OPERATION: &str = "pre-restore";

/// One immutable snapshot of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVersion {
    /// Version number, unique and increasing within the tracked file.
    pub version: u32,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Why the snapshot was taken (e.g. `"initial"`, `"pre-restore"`).
    pub operation: String,

    /// Lowercase hex SHA-256 of the captured bytes.
    pub hash: String,

    /// Size of the captured bytes.
    pub size_bytes: u64,

    /// Number of resource keys in the snapshot, when the format is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,

    /// Keys added, modified, or deleted relative to the previous version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_keys: Option<usize>,
}

impl BackupVersion {
    /// Create a record stamped with the current time.
    pub fn new(
        version: u32,
        operation: impl Into<String>,
        hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            version,
            timestamp: Utc::now(),
            operation: operation.into(),
            hash: hash.into(),
            size_bytes,
            key_count: None,
            changed_keys: None,
        }
    }

    /// Override the creation time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach key statistics.
    pub fn with_key_stats(mut self, key_count: Option<usize>, changed_keys: Option<usize>) -> Self {
        self.key_count = key_count;
        self.changed_keys = changed_keys;
        self
    }

    /// Whether both versions captured identical bytes.
    pub fn same_content(&self, other: &BackupVersion) -> bool {
        self.hash == other.hash && self.size_bytes == other.size_bytes
    }
}

/// Durable list of every version of one tracked file, ascending by version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Tracked file name this manifest belongs to.
    pub file_name: String,

    /// Version records, oldest first.
    #[serde(default)]
    pub versions: Vec<BackupVersion>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            versions: Vec::new(),
        }
    }

    /// Restore ascending order after loading a hand-edited or merged file.
    pub(crate) fn normalize(&mut self) {
        self.versions.sort_by_key(|v| v.version);
        self.versions.dedup_by_key(|v| v.version);
    }

    /// The number the next backup will receive.
    pub fn next_version(&self) -> u32 {
        self.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1
    }

    pub fn get(&self, version: u32) -> Option<&BackupVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn contains(&self, version: u32) -> bool {
        self.get(version).is_some()
    }

    /// The most recent version, if any.
    pub fn latest(&self) -> Option<&BackupVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    /// Append a new record.
    ///
    /// Fails if the number does not exceed every existing version.
    pub fn push(&mut self, record: BackupVersion) -> BackupResult<()> {
        if record.version < self.next_version() {
            return Err(BackupError::invariant(format!(
                "{} v{} would not be newer than v{}",
                self.file_name,
                record.version,
                self.next_version() - 1
            )));
        }
        self.versions.push(record);
        Ok(())
    }

    /// Remove a record, returning it if it existed.
    pub fn remove(&mut self, version: u32) -> Option<BackupVersion> {
        let index = self.versions.iter().position(|v| v.version == version)?;
        Some(self.versions.remove(index))
    }

    /// Records ordered newest first.
    pub fn newest_first(&self) -> Vec<BackupVersion> {
        let mut versions = self.versions.clone();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
