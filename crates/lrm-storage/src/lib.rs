//! Storage layer for lrm.
//!
//! Documents are JSON files addressed by path segments below a base
//! directory. Writes go to a temporary sibling and are renamed into place, so
//! a reader never observes a half-written document.

pub mod error;
pub mod json;

pub use error::{StorageError, StorageResult};
pub use json::{backups_storage, JsonStorage};
