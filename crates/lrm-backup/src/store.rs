//! Snapshot storage implementation.

use crate::error::{BackupError, BackupResult, IoResultExt};
use crate::version::Manifest;
use lrm_storage::JsonStorage;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Storage key of the manifest inside a tracked file's directory.
const MANIFEST_KEY: &str = "manifest";

/// Byte-exact snapshot copies plus one manifest per tracked file.
///
/// Snapshots are stored as plain file copies:
/// ```text
/// <base>/.lrm/backups/
///   <file name>/
///     manifest.json      # Every version's metadata
///     v1.<ext>           # Captured content, never rewritten
///     v2.<ext>
/// ```
///
/// Content is written before the manifest references it and the manifest
/// entry is dropped before the content is deleted, so an interruption can
/// leak an unreferenced copy but never leaves a dangling entry.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// Root of every tracked file's history (`<base>/.lrm/backups`).
    backups_dir: PathBuf,

    /// Manifest documents, rooted at `backups_dir`.
    manifests: JsonStorage,
}

impl SnapshotStore {
    /// Open the store for a project.
    ///
    /// Nothing is created on disk until the first snapshot is stored.
    pub fn new(base_path: &Path) -> Self {
        Self {
            backups_dir: lrm_util::path::backups_dir(base_path),
            manifests: lrm_storage::backups_storage(base_path),
        }
    }

    /// Get the root backups directory.
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Get the directory for one tracked file.
    pub fn file_dir(&self, file_name: &str) -> PathBuf {
        self.backups_dir.join(file_name)
    }

    /// Location of a version's content, whether or not it exists.
    pub fn snapshot_path(&self, file_name: &str, version: u32) -> PathBuf {
        let snapshot_name = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() => format!("v{version}.{ext}"),
            _ => format!("v{version}"),
        };
        self.file_dir(file_name).join(snapshot_name)
    }

    /// Load a tracked file's manifest; an untracked file has an empty one.
    pub async fn load_manifest(&self, file_name: &str) -> BackupResult<Manifest> {
        check_file_name(file_name)?;
        let loaded: Option<Manifest> = self.manifests.read(&[file_name, MANIFEST_KEY]).await?;

        let mut manifest = match loaded {
            Some(manifest) => manifest,
            None => return Ok(Manifest::new(file_name)),
        };
        if manifest.file_name != file_name {
            return Err(BackupError::invariant(format!(
                "manifest in {} belongs to {}",
                file_name, manifest.file_name
            )));
        }
        manifest.normalize();
        Ok(manifest)
    }

    /// Persist a manifest atomically.
    ///
    /// An empty manifest is removed together with its (then empty) directory.
    pub async fn save_manifest(&self, manifest: &Manifest) -> BackupResult<()> {
        let file_name = manifest.file_name.as_str();
        check_file_name(file_name)?;

        if !manifest.is_empty() {
            self.manifests
                .write(&[file_name, MANIFEST_KEY], manifest)
                .await?;
            return Ok(());
        }

        self.manifests.remove(&[file_name, MANIFEST_KEY]).await?;
        self.remove_empty_dir(file_name).await;
        Ok(())
    }

    async fn remove_empty_dir(&self, file_name: &str) {
        if let Err(e) = fs::remove_dir(self.file_dir(file_name)).await {
            debug!(file_name, error = %e, "Left backup directory in place");
        }
    }

    /// Names of every file with a manifest.
    pub async fn tracked_files(&self) -> BackupResult<Vec<String>> {
        Ok(self.manifests.list_children_with(&[], MANIFEST_KEY).await?)
    }

    /// Write a new version's content.
    ///
    /// Never overwrites: an existing copy for this version is an invariant
    /// violation, since numbers are assigned uniquely by the caller.
    pub async fn store(&self, file_name: &str, version: u32, content: &[u8]) -> BackupResult<PathBuf> {
        check_file_name(file_name)?;
        let dir = self.file_dir(file_name);
        fs::create_dir_all(&dir)
            .await
            .io_context(|| format!("creating backup directory for {file_name}"))?;

        let path = self.snapshot_path(file_name, version);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::invariant(format!(
                    "snapshot content for {file_name} v{version} already exists"
                )))
            }
            Err(e) => {
                return Err(BackupError::io(
                    format!("storing {file_name} v{version}"),
                    e,
                ))
            }
        };

        let written = async {
            file.write_all(content).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            self.discard_content(file_name, version).await;
            return Err(BackupError::io(format!("storing {file_name} v{version}"), e));
        }

        debug!(file_name, version, bytes = content.len(), "Stored snapshot content");
        Ok(path)
    }

    /// Resolve a version listed in the manifest to its content path.
    pub async fn resolve(&self, file_name: &str, version: u32) -> BackupResult<PathBuf> {
        let manifest = self.load_manifest(file_name).await?;
        if !manifest.contains(version) {
            return Err(BackupError::not_found(file_name, version));
        }

        let path = self.snapshot_path(file_name, version);
        let exists = fs::try_exists(&path)
            .await
            .io_context(|| format!("checking {file_name} v{version}"))?;
        if !exists {
            return Err(missing_content(file_name, version));
        }
        Ok(path)
    }

    /// Read a version's exact bytes.
    pub async fn read(&self, file_name: &str, version: u32) -> BackupResult<Vec<u8>> {
        let path = self.resolve(file_name, version).await?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(missing_content(file_name, version)),
            Err(e) => Err(BackupError::io(format!("reading {file_name} v{version}"), e)),
        }
    }

    /// Remove a version's manifest entry, then its content.
    ///
    /// Returns `false` when the manifest has no such version.
    pub async fn delete(&self, file_name: &str, version: u32) -> BackupResult<bool> {
        let remaining = match self.delist(file_name, version).await? {
            Some(remaining) => remaining,
            None => return Ok(false),
        };

        self.remove_content(file_name, version).await?;
        if remaining == 0 {
            self.remove_empty_dir(file_name).await;
        }

        debug!(file_name, version, "Deleted snapshot");
        Ok(true)
    }

    /// Drop `version` from the manifest without touching its content.
    ///
    /// Returns how many versions remain, or `None` if it was not listed.
    pub(crate) async fn delist(
        &self,
        file_name: &str,
        version: u32,
    ) -> BackupResult<Option<usize>> {
        let mut manifest = self.load_manifest(file_name).await?;
        if manifest.remove(version).is_none() {
            return Ok(None);
        }
        self.save_manifest(&manifest).await?;
        Ok(Some(manifest.versions.len()))
    }

    pub(crate) async fn remove_content(&self, file_name: &str, version: u32) -> BackupResult<()> {
        let path = self.snapshot_path(file_name, version);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(file_name, version, "Snapshot content was already missing");
                Ok(())
            }
            Err(e) => Err(BackupError::io(format!("deleting {file_name} v{version}"), e)),
        }
    }

    /// Best-effort removal of content no manifest entry will reference.
    pub(crate) async fn discard_content(&self, file_name: &str, version: u32) {
        if let Err(e) = self.remove_content(file_name, version).await {
            warn!(file_name, version, error = %e, "Failed to discard unreferenced snapshot");
        }
    }
}

fn check_file_name(file_name: &str) -> BackupResult<()> {
    if lrm_util::path::is_valid_file_name(file_name) {
        Ok(())
    } else {
        Err(BackupError::InvalidFileName(file_name.to_string()))
    }
}

fn missing_content(file_name: &str, version: u32) -> BackupError {
    BackupError::invariant(format!(
        "manifest lists {file_name} v{version} but its content is missing"
    ))
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Read a live resource file, mapping absence to `FileNotFound`.
pub(crate) async fn read_live_file(path: &Path) -> BackupResult<Vec<u8>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(BackupError::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(BackupError::io(format!("reading {}", path.display()), e)),
    }
}

/// Replace a live file's content all at once.
///
/// The bytes land in a temporary sibling which is synced and renamed over
/// the target, so the target holds either its old or its new content.
pub(crate) async fn replace_live_file(path: &Path, content: &[u8]) -> BackupResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .io_context(|| format!("creating {}", parent.display()))?;
    }

    let temp_path = lrm_util::path::sibling_temp_path(path);
    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temporary file");
            }
        }
        return Err(BackupError::io(format!("writing {}", path.display()), e));
    }
    Ok(())
}
