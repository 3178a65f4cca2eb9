//! Path utilities.
//!
//! Every project keeps its engine state under a hidden `.lrm/` directory next
//! to the resource files:
//!
//! ```text
//! <base>/.lrm/
//!   backups/
//!     <file name>/
//!       manifest.json
//!       v1.json
//!       v2.json
//! ```

use std::path::{Component, Path, PathBuf};

/// Name of the hidden per-project directory.
pub const PROJECT_DIR_NAME: &str = ".lrm";

/// Name of the backups directory inside [`PROJECT_DIR_NAME`].
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Get the project-local lrm directory.
pub fn project_dir(base_path: &Path) -> PathBuf {
    base_path.join(PROJECT_DIR_NAME)
}

/// Get the root directory holding every tracked file's history.
pub fn backups_dir(base_path: &Path) -> PathBuf {
    project_dir(base_path).join(BACKUPS_DIR_NAME)
}

/// Get the directory holding one tracked file's history.
pub fn tracked_file_dir(base_path: &Path, file_name: &str) -> PathBuf {
    backups_dir(base_path).join(file_name)
}

/// Extract the tracked file name (final component) of a path.
///
/// Returns `None` for paths without a UTF-8 file name (e.g. `/` or `..`).
pub fn tracked_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Check that a tracked file name is a single, plain path component.
pub fn is_valid_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Lowercase extension of a path, without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

/// A unique temporary path in the same directory as `target`.
///
/// Renaming within one directory keeps the replacement atomic on the same
/// filesystem.
pub fn sibling_temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let temp_name = format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple());
    match target.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}
