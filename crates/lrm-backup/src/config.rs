//! Backup configuration.
//!
//! Configuration is loaded from (later sources override earlier):
//! 1. Built-in defaults
//! 2. The `backup` section of `lrm.jsonc` or `lrm.json` in the project directory
//! 3. `LRM_BACKUP_ENABLED` and `LRM_BACKUP_MAX_VERSIONS` environment variables

use crate::error::{BackupError, BackupResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project configuration file names, in lookup order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["lrm.jsonc", "lrm.json"];

/// Environment variable overriding [`BackupConfig::enabled`].
pub const ENABLED_ENV_VAR: &str = "LRM_BACKUP_ENABLED";

/// Environment variable overriding [`BackupConfig::max_versions`].
pub const MAX_VERSIONS_ENV_VAR: &str = "LRM_BACKUP_MAX_VERSIONS";

/// Backup engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupConfig {
    /// Whether backups are taken at all.
    pub enabled: bool,

    /// Flat cap on versions kept per file, used when `retention` is absent.
    pub max_versions: usize,

    /// Tiered retention; replaces the flat cap when set.
    pub retention: Option<RetentionConfig>,

    /// Record key counts and changed-key counts on each backup.
    pub track_key_stats: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions: 10,
            retention: None,
            track_key_stats: true,
        }
    }
}

/// Grandfather-father-son retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionConfig {
    pub keep_all_for_hours: u32,
    pub keep_daily_for_days: u32,
    pub keep_weekly_for_weeks: u32,
    pub keep_monthly_for_months: u32,
    pub max_total_backups: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_all_for_hours: 24,
            keep_daily_for_days: 7,
            keep_weekly_for_weeks: 4,
            keep_monthly_for_months: 6,
            max_total_backups: 100,
        }
    }
}

/// The subset of the project file this crate reads.
#[derive(Debug, Default, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    backup: Option<BackupConfig>,
}

impl BackupConfig {
    /// Flat-cap configuration keeping `max_versions` versions.
    pub fn with_max_versions(max_versions: usize) -> Self {
        Self {
            max_versions,
            ..Self::default()
        }
    }

    /// Tiered-retention configuration.
    pub fn with_retention(retention: RetentionConfig) -> Self {
        Self {
            retention: Some(retention),
            ..Self::default()
        }
    }

    /// Load the configuration for a project.
    pub async fn load(base_path: &Path) -> BackupResult<Self> {
        let mut config = match Self::find_config_file(base_path).await {
            Some(path) => {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    BackupError::io(format!("reading {}", path.display()), e)
                })?;
                debug!(path = %path.display(), "Loaded backup configuration");
                Self::parse_jsonc(&content, &path.display().to_string())?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    async fn find_config_file(base_path: &Path) -> Option<PathBuf> {
        for name in CONFIG_FILE_NAMES {
            let path = base_path.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// Parse the `backup` section of a project file (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> BackupResult<Self> {
        let stripped = strip_comments(content);
        let file: ProjectFile = serde_json::from_str(&stripped)
            .map_err(|e| BackupError::Config(format!("{source}: {e}")))?;
        Ok(file.backup.unwrap_or_default())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`BackupConfig::load`]).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> BackupResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENABLED_ENV_VAR) {
            self.enabled = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(BackupError::Config(format!(
                        "{ENABLED_ENV_VAR} must be a boolean, got {other:?}"
                    )))
                }
            };
        }

        if let Some(value) = lookup(MAX_VERSIONS_ENV_VAR) {
            self.max_versions = value.trim().parse().map_err(|_| {
                BackupError::Config(format!(
                    "{MAX_VERSIONS_ENV_VAR} must be a positive integer, got {value:?}"
                ))
            })?;
        }

        Ok(())
    }

    /// Reject settings that would prune every version.
    pub fn validate(&self) -> BackupResult<()> {
        if self.max_versions == 0 {
            return Err(BackupError::Config(
                "maxVersions must be at least 1".to_string(),
            ));
        }
        if let Some(retention) = &self.retention {
            if retention.max_total_backups == 0 {
                return Err(BackupError::Config(
                    "retention.maxTotalBackups must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Strip `//` and `/* */` comments outside of string literals.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // Keep line numbers in parse errors accurate
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(c);
    }

    result
}
