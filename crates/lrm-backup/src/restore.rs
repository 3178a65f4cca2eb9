//! Rolling live files back to stored versions.
//!
//! A restore either replaces the target wholesale with a snapshot's exact
//! bytes, or merges a chosen set of keys from the snapshot into the target.
//! Everything that can fail (missing version, unparseable content) is
//! checked before the target is touched, and the target is replaced with a
//! single rename, so it never ends up half written.

use crate::diff::{hint_for, DiffEngine, DiffResult};
use crate::error::{BackupError, BackupResult};
use crate::manager::VersionManager;
use crate::resource::{decode_text, FormatHint, ResourceEntries};
use crate::store::{read_live_file, replace_live_file};
use crate::version::{BackupVersion, PRE_RESTORE_OPERATION};
use lrm_util::TimingGuard;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// What a restore did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Tracked file the snapshot came from.
    pub file_name: String,
    /// Version that was applied.
    pub version: u32,
    /// Safeguard snapshot of the target taken just before it was changed.
    pub pre_restore_backup: Option<BackupVersion>,
    /// Keys copied from the snapshot (selective restores only).
    pub restored_keys: Vec<String>,
    /// Requested keys the snapshot does not contain; left untouched.
    pub skipped_keys: Vec<String>,
}

impl RestoreOutcome {
    fn new(file_name: &str, version: u32) -> Self {
        Self {
            file_name: file_name.to_string(),
            version,
            pre_restore_backup: None,
            restored_keys: Vec::new(),
            skipped_keys: Vec::new(),
        }
    }
}

/// Applies stored versions back onto live files.
#[derive(Debug, Clone)]
pub struct RestoreService {
    manager: VersionManager,
}

impl RestoreService {
    pub fn new(manager: VersionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &VersionManager {
        &self.manager
    }

    /// Replace `target_file_path` with the exact bytes of `version`.
    pub async fn restore(
        &self,
        file_name: &str,
        version: u32,
        target_file_path: &Path,
        base_path: &Path,
        create_backup_before_restore: bool,
    ) -> BackupResult<RestoreOutcome> {
        let _timing = TimingGuard::restore(file_name, version);

        // Read before the safeguard backup, whose rotation may prune `version`.
        let content = self
            .manager
            .read_backup(file_name, version, base_path)
            .await?;

        let mut outcome = RestoreOutcome::new(file_name, version);
        outcome.pre_restore_backup = self
            .safeguard(target_file_path, base_path, create_backup_before_restore)
            .await?;

        replace_live_file(target_file_path, &content).await?;
        info!(
            file_name,
            version,
            target = %target_file_path.display(),
            "Restored backup"
        );
        Ok(outcome)
    }

    /// Copy the values of `keys` from `version` into `target_file_path`.
    ///
    /// Keys the snapshot lacks are reported in
    /// [`RestoreOutcome::skipped_keys`] and left as they are. All other keys
    /// of the target keep their current values and positions.
    pub async fn restore_keys<S: AsRef<str>>(
        &self,
        file_name: &str,
        version: u32,
        keys: &[S],
        target_file_path: &Path,
        base_path: &Path,
        create_backup_before_restore: bool,
    ) -> BackupResult<RestoreOutcome> {
        let _timing = TimingGuard::restore(file_name, version);

        let hint = hint_for(file_name, Some(target_file_path))?;
        let snapshot_bytes = self
            .manager
            .read_backup(file_name, version, base_path)
            .await?;

        let mut outcome = RestoreOutcome::new(file_name, version);
        if keys.is_empty() {
            debug!(file_name, version, "No keys requested");
            return Ok(outcome);
        }

        let snapshot = self.extract(&snapshot_bytes, &hint)?;
        let live_bytes = read_live_file(target_file_path).await?;
        let mut current = self.extract(&live_bytes, &hint)?;

        let mut seen: HashSet<&str> = HashSet::new();
        for key in keys {
            let key: &str = key.as_ref();
            if !seen.insert(key) {
                continue;
            }
            match snapshot.get(key) {
                Some(entry) => {
                    current.insert(key, entry.clone());
                    outcome.restored_keys.push(key.to_string());
                }
                None => outcome.skipped_keys.push(key.to_string()),
            }
        }

        if !outcome.skipped_keys.is_empty() {
            warn!(
                file_name,
                version,
                skipped = ?outcome.skipped_keys,
                "Requested keys are not in the backup"
            );
        }
        if outcome.restored_keys.is_empty() {
            return Ok(outcome);
        }

        let merged = self.manager.codecs().serialize(&current, &hint)?;

        outcome.pre_restore_backup = self
            .safeguard(target_file_path, base_path, create_backup_before_restore)
            .await?;

        replace_live_file(target_file_path, merged.as_bytes()).await?;
        info!(
            file_name,
            version,
            restored = outcome.restored_keys.len(),
            target = %target_file_path.display(),
            "Restored keys from backup"
        );
        Ok(outcome)
    }

    /// Changes a full restore of `version` would make to the target: old is
    /// the live file, new is the snapshot. Writes nothing.
    ///
    /// A missing target counts as empty, so every key shows as added.
    pub async fn preview_restore(
        &self,
        file_name: &str,
        version: u32,
        target_file_path: &Path,
        base_path: &Path,
    ) -> BackupResult<DiffResult> {
        let hint = hint_for(file_name, Some(target_file_path))?;
        let snapshot_bytes = self
            .manager
            .read_backup(file_name, version, base_path)
            .await?;
        let snapshot = self.extract(&snapshot_bytes, &hint)?;

        let live = match read_live_file(target_file_path).await {
            Ok(bytes) => self.extract(&bytes, &hint)?,
            Err(BackupError::FileNotFound(_)) => ResourceEntries::new(),
            Err(e) => return Err(e),
        };

        Ok(DiffEngine::compare_entries(&live, &snapshot, false))
    }

    /// Snapshot the target's current content, if asked to and possible.
    async fn safeguard(
        &self,
        target_file_path: &Path,
        base_path: &Path,
        requested: bool,
    ) -> BackupResult<Option<BackupVersion>> {
        if !requested {
            return Ok(None);
        }
        if !self.manager.config().enabled {
            warn!(
                target = %target_file_path.display(),
                "Backups are disabled; restoring without a pre-restore backup"
            );
            return Ok(None);
        }
        if !tokio::fs::try_exists(target_file_path).await.unwrap_or(false) {
            debug!(target = %target_file_path.display(), "Target does not exist; nothing to safeguard");
            return Ok(None);
        }

        let record = self
            .manager
            .create_backup(target_file_path, PRE_RESTORE_OPERATION, base_path)
            .await?;
        Ok(Some(record))
    }

    fn extract(&self, bytes: &[u8], hint: &FormatHint) -> BackupResult<ResourceEntries> {
        let text = decode_text(bytes, hint)?;
        self.manager.codecs().extract(&text, hint)
    }
}
