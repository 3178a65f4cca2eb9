//! Shared utilities for lrm.
//!
//! This crate provides common utilities used across the lrm workspace:
//! - Logging setup with tracing
//! - Path and tracked file name helpers for the `.lrm/` project directory
//! - RAII-based timing for backup and restore operations

pub mod log;
pub mod path;
pub mod timing;

pub use log::{LogConfig, LogLevel};
pub use timing::{Operation, TimingGuard};
