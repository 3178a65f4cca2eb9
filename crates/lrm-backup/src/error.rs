//! Backup error types.

use crate::resource::ResourceError;
use lrm_storage::StorageError;
use thiserror::Error;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Coarse classification of a [`BackupError`], for callers that only need to
/// decide between reporting, retrying, and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A requested version or file does not exist.
    NotFound,
    /// An underlying read, write, rename, or delete failed.
    IoFailure,
    /// Resource content or a manifest could not be parsed or emitted.
    SerializationFailure,
    /// Manifest and snapshot content disagree.
    InvariantViolation,
    /// The caller passed something unusable (bad file name, unknown format).
    InvalidInput,
    /// Configuration is invalid or disables the requested operation.
    Configuration,
}

/// Errors that can occur during backup, diff, and restore operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The tracked file has no such version.
    #[error("Backup not found: {file_name} v{version}")]
    NotFound { file_name: String, version: u32 },

    /// A live resource file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// IO error, with the operation and subject it happened on.
    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest storage failed.
    #[error("Manifest storage error: {0}")]
    Storage(#[from] StorageError),

    /// The resource extractor or serializer rejected the content.
    #[error("Serialization error: {0}")]
    Serialization(#[from] ResourceError),

    /// No codec is registered for the file's format.
    #[error("Unsupported resource format: {0}")]
    UnsupportedFormat(String),

    /// Manifest references missing content, or vice versa.
    #[error("Backup storage inconsistent: {0}")]
    InvariantViolation(String),

    /// The tracked file name cannot be used as a directory name.
    #[error("Invalid tracked file name: {0}")]
    InvalidFileName(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Invalid backup configuration: {0}")]
    Config(String),

    /// Backups are turned off in configuration.
    #[error("Backups are disabled")]
    Disabled,
}

impl BackupError {
    /// Create a not found error for a version of a tracked file.
    pub fn not_found(file_name: impl Into<String>, version: u32) -> Self {
        Self::NotFound {
            file_name: file_name.into(),
            version,
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::FileNotFound(_) => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::Storage(StorageError::Io(_)) => ErrorKind::IoFailure,
            Self::Storage(StorageError::Json { .. }) | Self::Serialization(_) => {
                ErrorKind::SerializationFailure
            }
            Self::Storage(StorageError::InvalidKey(_))
            | Self::InvalidFileName(_)
            | Self::UnsupportedFormat(_) => ErrorKind::InvalidInput,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Config(_) | Self::Disabled => ErrorKind::Configuration,
        }
    }

    /// Whether the caller can reasonably recover (e.g. by picking another
    /// version or fixing the file) rather than aborting the command.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::IoFailure | ErrorKind::InvariantViolation
        )
    }
}

/// Attach context to IO results.
pub(crate) trait IoResultExt<T> {
    fn io_context<F>(self, context: F) -> BackupResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context<F>(self, context: F) -> BackupResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BackupError::io(context(), e))
    }
}
