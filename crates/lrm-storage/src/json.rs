//! JSON file-based storage implementation.
//!
//! Each key is stored as a separate JSON file.
//! Keys are mapped to file paths: `["strings.json", "manifest"]` -> `strings.json/manifest.json`

use crate::{StorageError, StorageResult};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// JSON file-based storage.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    base_path: PathBuf,
}

impl JsonStorage {
    /// Create a new JSON storage at the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory every key is resolved against.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a key.
    pub fn key_to_path(&self, key: &[&str]) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("Key cannot be empty"));
        }

        for component in key {
            Self::check_component(component)?;
        }

        let mut path = self.base_path.clone();
        for component in key {
            path.push(component);
        }
        // `set_extension` would clobber dotted names such as `strings.json`.
        let mut file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        file_name.push(".json");
        path.set_file_name(file_name);

        Ok(path)
    }

    /// Get the directory path for a prefix.
    fn prefix_to_dir(&self, prefix: &[&str]) -> StorageResult<PathBuf> {
        let mut path = self.base_path.clone();
        for component in prefix {
            Self::check_component(component)?;
            path.push(component);
        }
        Ok(path)
    }

    fn check_component(component: &str) -> StorageResult<()> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component == "."
            || component == ".."
        {
            return Err(StorageError::invalid_key(format!(
                "Invalid key component: {}",
                component
            )));
        }
        Ok(())
    }

    /// Read a value from storage.
    ///
    /// Returns `None` if the key doesn't exist.
    pub async fn read<T: DeserializeOwned>(&self, key: &[&str]) -> StorageResult<Option<T>> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Reading from storage");

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let value: T = serde_json::from_str(&content)
                    .map_err(|e| StorageError::json(path.display().to_string(), e))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write a value to storage.
    ///
    /// The document is written to a uniquely named sibling, flushed to disk,
    /// then renamed over the previous version. Parent directories are
    /// created when missing.
    pub async fn write<T: Serialize>(&self, key: &[&str], value: &T) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Writing to storage");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StorageError::json(path.display().to_string(), e))?;

        let temp_path = lrm_util::path::sibling_temp_path(&path);
        if let Err(e) = write_synced(&temp_path, content.as_bytes()).await {
            discard_temp(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            discard_temp(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Remove a value from storage.
    ///
    /// Returns whether a document was actually removed.
    pub async fn remove(&self, key: &[&str]) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Removing from storage");

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Check if a key exists.
    pub async fn exists(&self, key: &[&str]) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// List the child directories of `prefix` that hold a `leaf` document.
    ///
    /// Names are returned sorted. A missing prefix directory yields an empty list.
    pub async fn list_children_with(&self, prefix: &[&str], leaf: &str) -> StorageResult<Vec<String>> {
        let dir = self.prefix_to_dir(prefix)?;
        Self::check_component(leaf)?;
        debug!(path = %dir.display(), leaf, "Listing storage");

        let mut results = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let leaf_file = format!("{leaf}.json");
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !fs::try_exists(entry.path().join(&leaf_file)).await? {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => results.push(name),
                Err(name) => warn!(?name, "Skipping non UTF-8 storage entry"),
            }
        }

        results.sort();
        Ok(results)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

/// Create the storage instance holding a project's backup manifests.
pub fn backups_storage(base_path: &Path) -> JsonStorage {
    JsonStorage::new(lrm_util::path::backups_dir(base_path))
}
