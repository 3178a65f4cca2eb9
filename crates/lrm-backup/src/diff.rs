//! Key-level comparison of resource snapshots.

use crate::error::{BackupError, BackupResult};
use crate::manager::VersionManager;
use crate::resource::{decode_text, FormatHint, ResourceEntries};
use crate::store::read_live_file;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;
use std::path::Path;

/// How a key differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// One key's change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub key: String,
    pub change_type: ChangeType,
    /// Value on the old side; absent for added keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    /// Value on the new side; absent for deleted keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

/// Count of changes per type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// A comparison's change set, sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub changes: Vec<ChangeRecord>,
    /// Whether unchanged keys were requested (and are therefore listed).
    pub include_unchanged: bool,
}

impl DiffResult {
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in &self.changes {
            match change.change_type {
                ChangeType::Added => summary.added += 1,
                ChangeType::Modified => summary.modified += 1,
                ChangeType::Deleted => summary.deleted += 1,
                ChangeType::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Whether any key was added, modified, or deleted.
    pub fn has_changes(&self) -> bool {
        self.changes
            .iter()
            .any(|c| c.change_type != ChangeType::Unchanged)
    }

    pub fn get(&self, key: &str) -> Option<&ChangeRecord> {
        self.changes.iter().find(|c| c.key == key)
    }
}

/// Compares resource content. Never writes anything.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    manager: VersionManager,
}

impl DiffEngine {
    /// Create a diff engine reading snapshots and codecs through `manager`.
    pub fn new(manager: VersionManager) -> Self {
        Self { manager }
    }

    /// Compare two extracted key sets.
    ///
    /// Values are compared as exact strings; comments are not compared.
    pub fn compare_entries(
        old: &ResourceEntries,
        new: &ResourceEntries,
        include_unchanged: bool,
    ) -> DiffResult {
        let keys: BTreeSet<&str> = old.keys().chain(new.keys()).collect();

        let changes = keys
            .into_iter()
            .filter_map(|key| {
                let old_value = old.value(key);
                let new_value = new.value(key);
                let change_type = match (old_value, new_value) {
                    (None, Some(_)) => ChangeType::Added,
                    (Some(_), None) => ChangeType::Deleted,
                    (Some(a), Some(b)) if a != b => ChangeType::Modified,
                    (Some(_), Some(_)) if include_unchanged => ChangeType::Unchanged,
                    _ => return None,
                };
                Some(ChangeRecord {
                    key: key.to_string(),
                    change_type,
                    old_value: old_value.map(str::to_string),
                    new_value: new_value.map(str::to_string),
                })
            })
            .collect();

        DiffResult {
            changes,
            include_unchanged,
        }
    }

    /// Compare two versions of content in the given format.
    pub fn compare(
        &self,
        old_content: &str,
        new_content: &str,
        hint: &FormatHint,
        include_unchanged: bool,
    ) -> BackupResult<DiffResult> {
        let codecs = self.manager.codecs();
        let old = codecs.extract(old_content, hint)?;
        let new = codecs.extract(new_content, hint)?;
        Ok(Self::compare_entries(&old, &new, include_unchanged))
    }

    /// Compare two stored versions of a tracked file.
    pub async fn compare_versions(
        &self,
        file_name: &str,
        old_version: u32,
        new_version: u32,
        base_path: &Path,
        include_unchanged: bool,
    ) -> BackupResult<DiffResult> {
        let hint = hint_for(file_name, None)?;
        let old = self.snapshot_text(file_name, old_version, base_path, &hint).await?;
        let new = self.snapshot_text(file_name, new_version, base_path, &hint).await?;
        self.compare(&old, &new, &hint, include_unchanged)
    }

    /// Compare a stored version (old side) with the live file (new side).
    ///
    /// The live file is read at call time. A missing live file is
    /// `FileNotFound` here, while [`RestoreService::preview_restore`] treats
    /// it as empty since restoring would create it.
    ///
    /// [`RestoreService::preview_restore`]: crate::RestoreService::preview_restore
    pub async fn compare_with_current(
        &self,
        file_name: &str,
        version: u32,
        live_file_path: &Path,
        base_path: &Path,
        include_unchanged: bool,
    ) -> BackupResult<DiffResult> {
        let hint = hint_for(file_name, Some(live_file_path))?;
        let snapshot = self.snapshot_text(file_name, version, base_path, &hint).await?;
        let live = decode_text(&read_live_file(live_file_path).await?, &hint)?;
        self.compare(&snapshot, &live, &hint, include_unchanged)
    }

    /// Line diff of a stored version against the live file, for display.
    pub async fn unified_diff_with_current(
        &self,
        file_name: &str,
        version: u32,
        live_file_path: &Path,
        base_path: &Path,
    ) -> BackupResult<String> {
        let snapshot = self
            .manager
            .read_backup(file_name, version, base_path)
            .await?;
        let live = read_live_file(live_file_path).await?;

        Ok(unified_diff(
            &String::from_utf8_lossy(&snapshot),
            &String::from_utf8_lossy(&live),
            &format!("{file_name} (v{version})"),
            &live_file_path.display().to_string(),
        ))
    }

    async fn snapshot_text(
        &self,
        file_name: &str,
        version: u32,
        base_path: &Path,
        hint: &FormatHint,
    ) -> BackupResult<String> {
        let bytes = self
            .manager
            .read_backup(file_name, version, base_path)
            .await?;
        decode_text(&bytes, hint)
    }
}

/// Format of a tracked file, preferring the live file's extension.
pub(crate) fn hint_for(file_name: &str, live_file_path: Option<&Path>) -> BackupResult<FormatHint> {
    live_file_path
        .and_then(|path| FormatHint::from_path(path))
        .or_else(|| FormatHint::from_path(file_name))
        .ok_or_else(|| BackupError::UnsupportedFormat(file_name.to_string()))
}

fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- {old_label}\n"));
    output.push_str(&format!("+++ {new_label}\n"));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
