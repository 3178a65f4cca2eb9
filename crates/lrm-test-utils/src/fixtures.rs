//! Test fixtures for creating reproducible test environments.
//!
//! Provides temporary project directories holding resource files and an
//! optional `lrm.json`, plus canned resource contents.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary test project with configurable file structure.
///
/// Creates a temporary directory that is automatically cleaned up
/// when the built project is dropped.
///
/// # Example
///
/// ```rust
/// use lrm_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_resource("locales/en.json", &[("Greeting", "Hello"), ("Farewell", "Bye")])
///     .with_config(r#"{ "backup": { "maxVersions": 3 } }"#)
///     .build();
///
/// assert!(project.path().join("locales/en.json").exists());
/// assert!(project.path().join("lrm.json").exists());
/// ```
pub struct TestProject {
    /// The temporary directory backing this project.
    temp_dir: TempDir,
    /// Files to create (path relative to root -> contents).
    files: BTreeMap<PathBuf, String>,
}

impl TestProject {
    /// Create a new test project builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
        }
    }

    /// Add a file to the project.
    ///
    /// The path should be relative to the project root.
    /// Parent directories are created automatically.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Add a flat JSON resource file with the given keys, in order.
    pub fn with_resource(self, path: impl AsRef<Path>, entries: &[(&str, &str)]) -> Self {
        self.with_file(path, content::json_resource(entries))
    }

    /// Add an `lrm.json` project configuration file.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("lrm.json", config)
    }

    /// Build the project, creating all files.
    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        BuiltTestProject {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test project with files created on disk.
///
/// The temporary directory is automatically cleaned up when this is dropped.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    /// Get the path to the project root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a project file.
    pub fn file_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.path().join(path.as_ref())
    }

    /// Read a file from the project.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.file_path(path);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Check if a file exists in the project.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.file_path(path).exists()
    }

    /// Write a file to the project (for modifying during tests).
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.file_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Overwrite a JSON resource file with the given keys, in order.
    pub fn write_resource(&self, path: impl AsRef<Path>, entries: &[(&str, &str)]) {
        self.write_file(path, content::json_resource(entries));
    }

    /// Delete a file from the project.
    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let full_path = self.file_path(path);
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("Failed to delete file {}: {}", full_path.display(), e));
    }

    /// Directory holding a tracked file's snapshots and manifest.
    pub fn backup_dir(&self, file_name: &str) -> PathBuf {
        lrm_util::path::tracked_file_dir(self.path(), file_name)
    }

    /// Names of the files in a tracked file's backup directory, sorted.
    pub fn list_backup_files(&self, file_name: &str) -> Vec<String> {
        let dir = self.backup_dir(file_name);
        if !dir.exists() {
            return Vec::new();
        }

        let mut names: Vec<String> = fs::read_dir(&dir)
            .unwrap_or_else(|e| panic!("Failed to read directory {}: {}", dir.display(), e))
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}

/// Common test file contents.
pub mod content {
    use super::{Map, Value};

    /// Render a flat JSON resource file, keys in the given order.
    pub fn json_resource(entries: &[(&str, &str)]) -> String {
        let map: Map<String, Value> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        let mut text = serde_json::to_string_pretty(&Value::Object(map))
            .expect("Failed to render resource");
        text.push('\n');
        text
    }

    /// English strings before an edit.
    pub const EN_V1: &[(&str, &str)] = &[
        ("Key1", "Hello"),
        ("Key2", "World"),
        ("Key3", "Goodbye"),
    ];

    /// English strings after an edit: Key1 changed, Key3 removed, Key4 added.
    pub const EN_V2: &[(&str, &str)] = &[
        ("Key1", "Hello there"),
        ("Key2", "World"),
        ("Key4", "New entry"),
    ];
}
