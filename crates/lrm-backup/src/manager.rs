//! Backup creation, lookup, and deletion.

use crate::config::BackupConfig;
use crate::diff::DiffEngine;
use crate::error::{BackupError, BackupResult};
use crate::resource::{decode_text, CodecRegistry, FormatHint, ResourceEntries};
use crate::rotation::RotationPolicy;
use crate::store::{content_hash, read_live_file, SnapshotStore};
use crate::version::{BackupVersion, Manifest};
use chrono::Utc;
use lrm_util::TimingGuard;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Versions removed (or not) by one rotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Versions that were deleted, ascending.
    pub deleted: Vec<u32>,
    /// Versions the policy named that are still listed, because their
    /// manifest entry could not be removed.
    pub failed: Vec<u32>,
    /// Versions no longer listed whose content file could not be removed.
    pub leaked: Vec<u32>,
}

/// Owns every tracked file's manifest read/modify/write cycle.
///
/// Holds no per-file state: manifests are read from disk on every call, so
/// separate invocations against the same project see each other's writes.
#[derive(Debug, Clone)]
pub struct VersionManager {
    config: BackupConfig,
    policy: RotationPolicy,
    codecs: CodecRegistry,
}

impl VersionManager {
    /// Create a manager from an explicit configuration.
    pub fn new(config: BackupConfig, codecs: CodecRegistry) -> BackupResult<Self> {
        config.validate()?;
        Ok(Self {
            policy: RotationPolicy::from_config(&config),
            config,
            codecs,
        })
    }

    /// Create a manager configured from the project at `base_path`, with the
    /// built-in codecs.
    pub async fn load(base_path: &Path) -> BackupResult<Self> {
        let config = BackupConfig::load(base_path).await?;
        Self::new(config, CodecRegistry::with_defaults())
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Snapshot the current content of `file_path`.
    ///
    /// The new version is authoritative once its manifest entry is written;
    /// failing to prune older versions afterwards is only logged.
    pub async fn create_backup(
        &self,
        file_path: &Path,
        operation: &str,
        base_path: &Path,
    ) -> BackupResult<BackupVersion> {
        if !self.config.enabled {
            return Err(BackupError::Disabled);
        }

        let file_name = lrm_util::path::tracked_file_name(file_path)
            .ok_or_else(|| BackupError::InvalidFileName(file_path.display().to_string()))?;
        let mut timing = TimingGuard::backup(&file_name);

        let content = read_live_file(file_path).await?;
        let store = SnapshotStore::new(base_path);
        let mut manifest = store.load_manifest(&file_name).await?;
        let version = manifest.next_version();
        timing.record_version(version);
        let hash = content_hash(&content);

        let (key_count, changed_keys) = self
            .key_stats(&store, &manifest, file_path, &content, &hash)
            .await;

        // A number above every manifest entry can only collide with content
        // leaked by an interrupted run.
        if tokio::fs::try_exists(store.snapshot_path(&file_name, version))
            .await
            .unwrap_or(false)
        {
            warn!(file_name = %file_name, version, "Replacing unreferenced snapshot content");
            store.discard_content(&file_name, version).await;
        }
        store.store(&file_name, version, &content).await?;

        let record = BackupVersion::new(version, operation, hash, content.len() as u64)
            .with_key_stats(key_count, changed_keys);
        manifest.push(record.clone())?;
        if let Err(e) = store.save_manifest(&manifest).await {
            store.discard_content(&file_name, version).await;
            return Err(e);
        }

        info!(
            file_name = %file_name,
            version,
            operation,
            size_bytes = record.size_bytes,
            "Created backup"
        );

        let outcome = self.rotate(&store, &manifest).await;
        if !outcome.failed.is_empty() || !outcome.leaked.is_empty() {
            warn!(
                file_name = %file_name,
                failed = ?outcome.failed,
                leaked = ?outcome.leaked,
                "Some versions could not be pruned"
            );
        }

        Ok(record)
    }

    /// Key count of `content` and the number of keys changed since the
    /// latest version. Best effort: any failure leaves the stats empty.
    async fn key_stats(
        &self,
        store: &SnapshotStore,
        manifest: &Manifest,
        file_path: &Path,
        content: &[u8],
        hash: &str,
    ) -> (Option<usize>, Option<usize>) {
        if !self.config.track_key_stats {
            return (None, None);
        }
        let hint = match FormatHint::from_path(file_path) {
            Some(hint) if self.codecs.supports(&hint) => hint,
            _ => return (None, None),
        };

        let current = match self.extract(content, &hint) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "Could not read keys for backup statistics");
                return (None, None);
            }
        };

        let previous = match manifest.latest() {
            Some(previous) => previous,
            None => return (Some(current.len()), None),
        };
        if previous.hash == hash {
            return (Some(current.len()), Some(0));
        }

        let changed = match store.read(&manifest.file_name, previous.version).await {
            Ok(bytes) => match self.extract(&bytes, &hint) {
                Ok(old) => Some(
                    DiffEngine::compare_entries(&old, &current, false)
                        .changes
                        .len(),
                ),
                Err(e) => {
                    debug!(version = previous.version, error = %e, "Previous version has unreadable keys");
                    None
                }
            },
            Err(e) => {
                warn!(version = previous.version, error = %e, "Could not read previous version");
                None
            }
        };
        (Some(current.len()), changed)
    }

    fn extract(&self, content: &[u8], hint: &FormatHint) -> BackupResult<ResourceEntries> {
        let text = decode_text(content, hint)?;
        self.codecs.extract(&text, hint)
    }

    /// Delete whatever the policy names. Never fails; see [`RotationOutcome`].
    async fn rotate(&self, store: &SnapshotStore, manifest: &Manifest) -> RotationOutcome {
        let _timing = TimingGuard::rotation(&manifest.file_name);
        let mut outcome = RotationOutcome::default();

        for version in self.policy.select_for_deletion(&manifest.versions, Utc::now()) {
            let file_name = manifest.file_name.as_str();
            match store.delist(file_name, version).await {
                Ok(None) => {}
                Ok(Some(_)) => match store.remove_content(file_name, version).await {
                    Ok(()) => outcome.deleted.push(version),
                    Err(e) => {
                        warn!(
                            file_name,
                            version,
                            error = %e,
                            "Pruned backup left its content behind"
                        );
                        outcome.leaked.push(version);
                    }
                },
                Err(e) => {
                    warn!(file_name, version, error = %e, "Failed to prune backup");
                    outcome.failed.push(version);
                }
            }
        }

        if !outcome.deleted.is_empty() {
            debug!(
                file_name = %manifest.file_name,
                deleted = ?outcome.deleted,
                "Pruned old backups"
            );
        }
        outcome
    }

    /// Every surviving version, newest first. Untracked files have none.
    pub async fn list_backups(
        &self,
        file_name: &str,
        base_path: &Path,
    ) -> BackupResult<Vec<BackupVersion>> {
        let manifest = SnapshotStore::new(base_path).load_manifest(file_name).await?;
        Ok(manifest.newest_first())
    }

    /// The record of one version.
    pub async fn get_backup(
        &self,
        file_name: &str,
        version: u32,
        base_path: &Path,
    ) -> BackupResult<BackupVersion> {
        let manifest = SnapshotStore::new(base_path).load_manifest(file_name).await?;
        manifest
            .get(version)
            .cloned()
            .ok_or_else(|| BackupError::not_found(file_name, version))
    }

    /// The newest version, if the file has any.
    pub async fn latest_backup(
        &self,
        file_name: &str,
        base_path: &Path,
    ) -> BackupResult<Option<BackupVersion>> {
        let manifest = SnapshotStore::new(base_path).load_manifest(file_name).await?;
        Ok(manifest.latest().cloned())
    }

    /// Where a version's content is stored.
    pub async fn get_backup_file_path(
        &self,
        file_name: &str,
        version: u32,
        base_path: &Path,
    ) -> BackupResult<PathBuf> {
        SnapshotStore::new(base_path).resolve(file_name, version).await
    }

    /// A version's exact captured bytes.
    pub async fn read_backup(
        &self,
        file_name: &str,
        version: u32,
        base_path: &Path,
    ) -> BackupResult<Vec<u8>> {
        SnapshotStore::new(base_path).read(file_name, version).await
    }

    /// Delete one version. Returns `false` if it did not exist.
    pub async fn delete_backup(
        &self,
        file_name: &str,
        version: u32,
        base_path: &Path,
    ) -> BackupResult<bool> {
        let deleted = SnapshotStore::new(base_path).delete(file_name, version).await?;
        if deleted {
            info!(file_name, version, "Deleted backup");
        }
        Ok(deleted)
    }

    /// Run the configured policy now, outside of a backup.
    pub async fn apply_rotation(
        &self,
        file_name: &str,
        base_path: &Path,
    ) -> BackupResult<RotationOutcome> {
        let store = SnapshotStore::new(base_path);
        let manifest = store.load_manifest(file_name).await?;
        Ok(self.rotate(&store, &manifest).await)
    }

    /// Delete every version of a file, and with the last one its manifest.
    ///
    /// Returns how many versions were removed.
    pub async fn delete_all(&self, file_name: &str, base_path: &Path) -> BackupResult<usize> {
        let store = SnapshotStore::new(base_path);
        let manifest = store.load_manifest(file_name).await?;

        let mut deleted = 0;
        for record in &manifest.versions {
            if store.delete(file_name, record.version).await? {
                deleted += 1;
            }
        }

        info!(file_name, deleted, "Deleted all backups");
        Ok(deleted)
    }

    /// Names of every file that has backups.
    pub async fn list_tracked_files(&self, base_path: &Path) -> BackupResult<Vec<String>> {
        SnapshotStore::new(base_path).tracked_files().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn manager(config: BackupConfig) -> VersionManager {
        VersionManager::new(config, CodecRegistry::with_defaults()).unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_versions_start_at_one_and_increase() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let file = write(&dir, "strings.json", r#"{"A": "1"}"#);

        for expected in 1..=3 {
            let record = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
            assert_eq!(record.version, expected);
        }

        let listed: Vec<u32> = manager
            .list_backups("strings.json", dir.path())
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(listed, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_flat_cap_keeps_largest_versions() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::with_max_versions(3));
        let file = write(&dir, "strings.json", "{}");

        for i in 0..6 {
            std::fs::write(&file, format!(r#"{{"K": "{i}"}}"#)).unwrap();
            manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        }

        let listed = manager.list_backups("strings.json", dir.path()).await.unwrap();
        let versions: Vec<u32> = listed.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![6, 5, 4]);
        assert!(manager
            .get_backup_file_path("strings.json", 1, dir.path())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());

        let err = manager
            .create_backup(&dir.path().join("missing.json"), "edit", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::FileNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_disabled() {
        let dir = TempDir::new().unwrap();
        let config = BackupConfig {
            enabled: false,
            ..BackupConfig::default()
        };
        let file = write(&dir, "strings.json", "{}");

        let err = manager(config)
            .create_backup(&file, "edit", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Disabled));
        assert!(!dir.path().join(".lrm").exists());
    }

    #[tokio::test]
    async fn test_hash_tracks_content() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let file = write(&dir, "strings.json", r#"{"A": "1"}"#);

        let v1 = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        let v2 = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        std::fs::write(&file, r#"{"A": "2"}"#).unwrap();
        let v3 = manager.create_backup(&file, "edit", dir.path()).await.unwrap();

        assert_eq!(v1.hash, v2.hash);
        assert!(v1.same_content(&v2));
        assert_ne!(v2.hash, v3.hash);
    }

    #[tokio::test]
    async fn test_key_stats() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let file = write(&dir, "strings.json", r#"{"A": "1", "B": "2", "C": "3"}"#);

        let v1 = manager.create_backup(&file, "initial", dir.path()).await.unwrap();
        assert_eq!(v1.key_count, Some(3));
        assert_eq!(v1.changed_keys, None);

        let v2 = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        assert_eq!(v2.changed_keys, Some(0));

        std::fs::write(&file, r#"{"A": "1", "B": "9", "D": "4"}"#).unwrap();
        let v3 = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        assert_eq!(v3.key_count, Some(3));
        assert_eq!(v3.changed_keys, Some(3));
    }

    #[tokio::test]
    async fn test_key_stats_never_fail_backup() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let broken = write(&dir, "broken.json", "{ not json");
        let unknown = write(&dir, "strings.resx", "<root/>");

        let record = manager.create_backup(&broken, "edit", dir.path()).await.unwrap();
        assert_eq!(record.key_count, None);

        let record = manager.create_backup(&unknown, "edit", dir.path()).await.unwrap();
        assert_eq!(record.key_count, None);
        assert_eq!(
            manager.read_backup("strings.resx", 1, dir.path()).await.unwrap(),
            b"<root/>"
        );
    }

    #[tokio::test]
    async fn test_delete_backup() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let file = write(&dir, "strings.json", "{}");
        manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        manager.create_backup(&file, "edit", dir.path()).await.unwrap();

        assert!(manager.delete_backup("strings.json", 1, dir.path()).await.unwrap());
        assert!(!manager.delete_backup("strings.json", 1, dir.path()).await.unwrap());

        let err = manager
            .get_backup_file_path("strings.json", 1, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound { version: 1, .. }));
        assert!(matches!(
            manager.get_backup("strings.json", 1, dir.path()).await,
            Err(BackupError::NotFound { .. })
        ));

        let latest = manager.latest_backup("strings.json", dir.path()).await.unwrap();
        assert_eq!(latest.map(|v| v.version), Some(2));
    }

    #[tokio::test]
    async fn test_list_untracked_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        assert!(manager
            .list_backups("strings.json", dir.path())
            .await
            .unwrap()
            .is_empty());
        assert!(manager
            .latest_backup("strings.json", dir.path())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_all_and_tracked_files() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let a = write(&dir, "a.json", "{}");
        let b = write(&dir, "b.json", "{}");
        manager.create_backup(&a, "edit", dir.path()).await.unwrap();
        manager.create_backup(&a, "edit", dir.path()).await.unwrap();
        manager.create_backup(&b, "edit", dir.path()).await.unwrap();

        assert_eq!(
            manager.list_tracked_files(dir.path()).await.unwrap(),
            vec!["a.json".to_string(), "b.json".to_string()]
        );

        assert_eq!(manager.delete_all("a.json", dir.path()).await.unwrap(), 2);
        assert_eq!(
            manager.list_tracked_files(dir.path()).await.unwrap(),
            vec!["b.json".to_string()]
        );
        assert!(!dir.path().join(".lrm/backups/a.json").exists());
    }

    #[tokio::test]
    async fn test_apply_rotation_after_policy_change() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "strings.json", "{}");
        let loose = manager(BackupConfig::default());
        for _ in 0..5 {
            loose.create_backup(&file, "edit", dir.path()).await.unwrap();
        }

        let strict = manager(BackupConfig::with_retention(RetentionConfig {
            max_total_backups: 2,
            ..RetentionConfig::default()
        }));
        let outcome = strict.apply_rotation("strings.json", dir.path()).await.unwrap();
        assert_eq!(outcome.deleted, vec![1, 2, 3]);
        assert!(outcome.failed.is_empty());
        assert!(outcome.leaked.is_empty());
        assert_eq!(
            strict.list_backups("strings.json", dir.path()).await.unwrap().len(),
            2
        );
    }

    /// Swap a version's content file for a directory `remove_file` cannot unlink.
    fn make_undeletable(dir: &TempDir, file_name: &str, version: u32) {
        let content = dir
            .path()
            .join(format!(".lrm/backups/{file_name}/v{version}.json"));
        std::fs::remove_file(&content).unwrap();
        std::fs::create_dir(&content).unwrap();
        std::fs::write(content.join("blocker"), "x").unwrap();
    }

    #[tokio::test]
    async fn test_failed_prune_does_not_fail_backup() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "strings.json", r#"{"A": "1"}"#);
        let manager = manager(BackupConfig::with_max_versions(1));

        manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        make_undeletable(&dir, "strings.json", 1);

        std::fs::write(&file, r#"{"A": "2"}"#).unwrap();
        let record = manager
            .create_backup(&file, "edit", dir.path())
            .await
            .expect("pruning failure must not fail the backup");
        assert_eq!(record.version, 2);

        let listed = manager.list_backups("strings.json", dir.path()).await.unwrap();
        let numbers: Vec<u32> = listed.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![2]);
        assert_eq!(
            manager.read_backup("strings.json", 2, dir.path()).await.unwrap(),
            br#"{"A": "2"}"#.to_vec()
        );
    }

    #[tokio::test]
    async fn test_apply_rotation_reports_leaked_content() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "strings.json", "{}");
        let loose = manager(BackupConfig::default());
        for _ in 0..3 {
            loose.create_backup(&file, "edit", dir.path()).await.unwrap();
        }
        make_undeletable(&dir, "strings.json", 1);

        let strict = manager(BackupConfig::with_max_versions(1));
        let outcome = strict.apply_rotation("strings.json", dir.path()).await.unwrap();
        assert_eq!(outcome.deleted, vec![2]);
        assert_eq!(outcome.leaked, vec![1]);
        assert!(outcome.failed.is_empty());

        // Delisted even though its content stayed behind.
        let err = strict.get_backup("strings.json", 1, dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(dir.path().join(".lrm/backups/strings.json/v1.json").exists());

        let again = strict.apply_rotation("strings.json", dir.path()).await.unwrap();
        assert_eq!(again, RotationOutcome::default());
    }

    #[tokio::test]
    async fn test_leaked_content_is_replaced() {
        let dir = TempDir::new().unwrap();
        let manager = manager(BackupConfig::default());
        let file = write(&dir, "strings.json", r#"{"A": "real"}"#);

        let store = SnapshotStore::new(dir.path());
        store.store("strings.json", 1, b"leaked").await.unwrap();

        let record = manager.create_backup(&file, "edit", dir.path()).await.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(
            manager.read_backup("strings.json", 1, dir.path()).await.unwrap(),
            br#"{"A": "real"}"#
        );
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = VersionManager::new(BackupConfig::with_max_versions(0), CodecRegistry::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
