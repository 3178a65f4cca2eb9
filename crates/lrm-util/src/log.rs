//! Logging setup using tracing.
//!
//! Library crates only emit events; binaries and test harnesses call [`init`]
//! once to install a subscriber.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable consulted before the configured level.
pub const LOG_ENV_VAR: &str = "LRM_LOG";

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to print logs to stderr.
    pub print: bool,
    /// Log level.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
    /// Route output through the libtest capture writer.
    pub test_writer: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            print: false,
            level: LogLevel::Info,
            include_location: false,
            test_writer: false,
        }
    }
}

impl LogConfig {
    /// Configuration suited to test binaries: debug level, captured output.
    pub fn for_tests() -> Self {
        Self {
            print: true,
            level: LogLevel::Debug,
            include_location: true,
            test_writer: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Initialize logging with the given configuration.
///
/// Returns `false` when a global subscriber was already installed, which is
/// expected when several tests in one binary call this.
pub fn init(config: LogConfig) -> bool {
    let subscriber = tracing_subscriber::registry().with(config.filter());

    if !config.print {
        return subscriber.try_init().is_ok();
    }

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.test_writer {
        subscriber
            .with(fmt_layer.with_test_writer())
            .try_init()
            .is_ok()
    } else {
        subscriber.with(fmt_layer).try_init().is_ok()
    }
}
