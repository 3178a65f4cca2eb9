//! Versioned backup and restore for localization resource files.
//!
//! This crate protects resource files against destructive edits:
//! - Snapshot a file before a risky operation
//! - Keep a bounded history per file (flat cap or tiered retention)
//! - Diff any two versions, or a version against the live file, key by key
//! - Restore a file fully (byte-exact) or for selected keys only
//!
//! # Example
//!
//! ```no_run
//! use lrm_backup::{RestoreService, VersionManager};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let base = Path::new("/project");
//! let manager = VersionManager::load(base).await?;
//!
//! // Snapshot before editing
//! let backup = manager
//!     .create_backup(&base.join("locales/en.json"), "before-import", base)
//!     .await?;
//!
//! // ... edit the file ...
//!
//! // Roll back if needed, keeping a copy of the edited state
//! let restore = RestoreService::new(manager);
//! restore
//!     .restore("en.json", backup.version, &base.join("locales/en.json"), base, true)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod diff;
mod error;
mod manager;
mod resource;
mod restore;
mod rotation;
mod store;
mod version;

pub use config::{BackupConfig, RetentionConfig};
pub use diff::{ChangeRecord, ChangeType, DiffEngine, DiffResult, DiffSummary};
pub use error::{BackupError, BackupResult, ErrorKind};
pub use manager::{RotationOutcome, VersionManager};
pub use resource::{
    CodecRegistry, FormatHint, JsonCodec, ResourceCodec, ResourceEntries, ResourceEntry,
    ResourceError,
};
pub use restore::{RestoreOutcome, RestoreService};
pub use rotation::{RetentionTiers, RotationPolicy};
pub use store::{content_hash, SnapshotStore};
pub use version::{BackupVersion, Manifest, PRE_RESTORE_OPERATION};
