//! Custom assertion helpers for common test patterns.
//!
//! Provides functions and macros that make failures readable, most notably
//! line diffs when file content does not match.

use std::path::Path;

/// Assert that a file's content equals expected text exactly.
///
/// Fails with a line diff of expected against actual.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    if content != expected {
        panic!(
            "File {} content does not match expected.\nDiff:\n{}",
            path.display(),
            render_diff(expected, &content)
        );
    }
}

/// Assert that a file holds exactly the given bytes.
pub fn assert_file_bytes_equal(path: &Path, expected: &[u8]) {
    let content = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    if content != expected {
        panic!(
            "File {} bytes do not match expected ({} bytes, expected {}).\nDiff:\n{}",
            path.display(),
            content.len(),
            expected.len(),
            render_diff(
                &String::from_utf8_lossy(expected),
                &String::from_utf8_lossy(&content)
            )
        );
    }
}

/// Assert that two strings are equal, with a nice diff on failure.
pub fn assert_strings_equal(actual: &str, expected: &str) {
    if actual != expected {
        panic!("Strings are not equal.\nDiff:\n{}", render_diff(expected, actual));
    }
}

fn render_diff(expected: &str, actual: &str) -> String {
    let diff = similar::TextDiff::from_lines(expected, actual);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{}{}", sign, change));
        if change.missing_newline() {
            output.push('\n');
        }
    }

    output
}

/// Assert that a result is Ok and extract the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(value) => panic!("{}: {:?}", $msg, value),
            Err(e) => e,
        }
    };
}
