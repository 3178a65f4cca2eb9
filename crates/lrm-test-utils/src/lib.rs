//! Testing utilities and fixtures for lrm.
//!
//! - **Fixtures**: temporary projects holding resource files
//! - **Assertions**: file and string assertions with readable failure output
//! - **Logging**: tracing output captured by the test harness
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use lrm_test_utils::{fixtures::TestProject, init_test_logging};
//!
//! #[tokio::test]
//! async fn test_backup() {
//!     init_test_logging();
//!     let project = TestProject::new()
//!         .with_resource("locales/en.json", &[("Greeting", "Hello")])
//!         .build();
//!
//!     assert!(project.path().join("locales/en.json").exists());
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use fixtures::{BuiltTestProject, TestProject};

/// Route tracing output through the test harness's captured writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// Set `LRM_LOG=debug` to see engine logs for failing tests.
pub fn init_test_logging() {
    let _ = lrm_util::log::init(lrm_util::LogConfig::for_tests());
}
