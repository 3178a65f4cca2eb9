//! Duration logging for backup engine operations.
//!
//! ```rust,ignore
//! use lrm_util::timing::TimingGuard;
//!
//! let mut timing = TimingGuard::backup("strings.json");
//! let version = manifest.next_version();
//! timing.record_version(version);
//! // logged with file_name, version and duration when `timing` drops
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Operations above this are logged at warn level.
const SLOW_THRESHOLD: Duration = Duration::from_secs(1);

/// What a [`TimingGuard`] is measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
    Rotation,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Rotation => "rotation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs how long an operation on one tracked file took, once dropped.
///
/// The version is optional because a backup only learns its number after
/// reading the manifest.
#[derive(Debug)]
pub struct TimingGuard {
    operation: Operation,
    file_name: String,
    version: Option<u32>,
    start: Instant,
}

impl TimingGuard {
    fn start(operation: Operation, file_name: impl Into<String>, version: Option<u32>) -> Self {
        Self {
            operation,
            file_name: file_name.into(),
            version,
            start: Instant::now(),
        }
    }

    pub fn backup(file_name: impl Into<String>) -> Self {
        Self::start(Operation::Backup, file_name, None)
    }

    /// Times restoring `version` of `file_name`.
    pub fn restore(file_name: impl Into<String>, version: u32) -> Self {
        Self::start(Operation::Restore, file_name, Some(version))
    }

    pub fn rotation(file_name: impl Into<String>) -> Self {
        Self::start(Operation::Rotation, file_name, None)
    }

    /// Ties the log line to the version being written.
    pub fn record_version(&mut self, version: u32) {
        self.version = Some(version);
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let duration = format_duration(elapsed);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if elapsed >= SLOW_THRESHOLD {
            warn!(
                operation = %self.operation,
                file_name = %self.file_name,
                version = self.version,
                duration_ms,
                duration = %duration,
                "Slow {} finished",
                self.operation
            );
        } else {
            debug!(
                operation = %self.operation,
                file_name = %self.file_name,
                version = self.version,
                duration_ms,
                duration = %duration,
                "{} finished",
                self.operation
            );
        }
    }
}

fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_carries_version() {
        let guard = TimingGuard::restore("strings.json", 4);
        assert_eq!(guard.operation, Operation::Restore);
        assert_eq!(guard.version, Some(4));
    }

    #[test]
    fn test_backup_records_version_late() {
        let mut guard = TimingGuard::backup("strings.json");
        assert_eq!(guard.version, None);
        guard.record_version(7);
        assert_eq!(guard.version, Some(7));
        assert_eq!(TimingGuard::rotation("strings.json").operation.as_str(), "rotation");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90.00s");
    }
}
