//! Environment file parser
//!
//! Turns `KEY=VALUE` text into an ordered list of [`EnvVariable`] records.
//!
//! # Format
//!
//! ```text
//! # comment lines and blank lines are skipped
//! DATABASE_HOST=localhost
//! DATABASE_PASSWORD="${vault:secret/db/password}"
//! ```
//!
//! - A line is split on its first `=`; lines without one are skipped.
//! - Key and value are trimmed of surrounding whitespace.
//! - A value wholly wrapped in one matching pair of `"` or `'` has the pair
//!   removed. No escape processing happens inside the quotes.
//! - Line numbers are 1-based over every physical line, skipped ones included.

use serde::Serialize;

/// A single variable parsed from an environment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVariable {
    /// Variable name
    pub key: String,
    /// Value with surrounding whitespace and one quote pair removed
    pub value: String,
    /// 1-based physical line number
    pub line_number: usize,
    /// The original line text
    pub raw_line: String,
}

/// Parse environment file content into variables, in file order
pub fn parse(content: &str) -> Vec<EnvVariable> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| parse_line(line, index + 1))
        .collect()
}

fn parse_line(line: &str, line_number: usize) -> Option<EnvVariable> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;

    Some(EnvVariable {
        key: key.trim().to_string(),
        value: strip_quotes(value.trim()).to_string(),
        line_number,
        raw_line: line.to_string(),
    })
}

/// Remove one matching pair of wrapping quotes
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
