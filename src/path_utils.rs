//! Path utilities shared by the locator, aggregator and storage modules.
//!
//! This module provides helpers for lossy name extraction, hidden-entry
//! filtering, extension allow-lists and the numeric-aware name ordering that
//! decides chapter and page order.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::Path;

/// Converts a path to a string with fallback to lossy conversion.
pub fn path_to_string_lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Returns
///
/// * `String` - The file name, or `"unknown"` when the path has none
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Checks if a filename starts with a dot (hidden file).
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Normalizes an extension allow-list: lower-case, no leading dot, no blanks,
/// no duplicates.
pub fn normalize_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }
    normalized
}

/// Whether `path` carries one of the (normalized) allow-listed extensions.
/// Matching is case-insensitive.
pub fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == e)
        })
        .unwrap_or(false)
}

/// Orders two paths by file name with numeric-aware comparison, so
/// `"page2.jpg"` precedes `"page10.jpg"` and `"chapter 2"` precedes `"chapter 10"`.
///
/// Names the natural comparison considers equal (`"01"` and `"1"`) fall back to
/// byte order, which keeps the ordering total and reproducible.
pub fn compare_names_natural(a: &Path, b: &Path) -> Ordering {
    let a_name = get_file_name_lossy(a);
    let b_name = get_file_name_lossy(b);
    natord::compare(&a_name, &b_name).then_with(|| a_name.cmp(&b_name))
}

/// Last modification time of an entry, falling back to the Unix epoch on
/// platforms that cannot report it.
pub fn modified_utc(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
