//! Utility functions for common operations.

use chrono::DateTime;
use std::path::{Path, PathBuf};

/// Characters that aren't allowed in file names on at least one platform.
const FORBIDDEN_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turns a story title into something usable as a file name.
///
/// Forbidden and control characters become `_`, surrounding dots and spaces
/// are dropped, and an empty result falls back to `story`.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "story".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Path of the finished book inside `directory`.
pub fn output_path(directory: &Path, title: &str, extension: &str) -> PathBuf {
    directory.join(format!("{}.{}", sanitize_filename(title), extension))
}

/// Formats epoch seconds as UTC using a `strftime` pattern.
pub fn format_epoch(epoch_seconds: i64, format: &str) -> Option<String> {
    DateTime::from_timestamp(epoch_seconds, 0).map(|dt| dt.format(format).to_string())
}

/// Escapes text for inclusion in XHTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
