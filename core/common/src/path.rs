//! Path normalization for backend keys.
//!
//! Callers address files as a `path` (parent directory) plus a `name`
//! (leaf segment). Drivers address them by a single canonical key using
//! `/` as separator and no leading separator. Directory keys carry a
//! trailing separator so object stores can store them as marker objects.
//!
//! Normalization never fails. Validation is a separate step drivers run
//! before touching the backend.

use crate::{Error, Result};

/// Key separator used by every backend.
pub const SEPARATOR: char = '/';

/// Strip leading separators.
///
/// Internal and trailing separators and case are left alone. Clean input
/// is returned unchanged, so `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: &str) -> &str {
    path.trim_start_matches(SEPARATOR)
}

/// Build the key of a file named `name` inside `path`.
///
/// Returns `name` verbatim when `path` is empty after normalization.
pub fn build_key(path: &str, name: &str) -> String {
    let parent = normalize(path).trim_end_matches(SEPARATOR);
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, SEPARATOR, name)
    }
}

/// Build the key of a directory named `name` inside `path`.
///
/// Same as [`build_key`] but the result always ends with a separator.
pub fn build_directory_key(path: &str, name: &str) -> String {
    let mut key = build_key(path, name);
    if !key.ends_with(SEPARATOR) {
        key.push(SEPARATOR);
    }
    key
}

/// Check if a key names a directory (marker form).
pub fn is_directory_key(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}

/// Validate a leaf name supplied by a caller.
///
/// # Errors
/// - `InvalidArgument` if the name is empty, `.` or `..`, or contains a
///   separator or NUL byte
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("Name cannot be empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidArgument(format!(
            "Name cannot be '{}'",
            name
        )));
    }
    if name.contains(SEPARATOR) || name.contains('\\') {
        return Err(Error::InvalidArgument(format!(
            "Name cannot contain separators: {}",
            name
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidArgument("Name cannot contain NUL".to_string()));
    }
    Ok(())
}

/// Validate a normalized key.
///
/// The empty key (backend root) is accepted; a single trailing separator
/// is accepted for directory keys. A leading separator is only rejected
/// for keys passed in raw; [`normalize_checked`] strips them first.
///
/// # Errors
/// - `InvalidArgument` if the key starts with a separator, contains an
///   empty, `.` or `..` segment, or contains a NUL byte
pub fn validate_key(key: &str) -> Result<()> {
    if key.contains('\0') {
        return Err(Error::InvalidArgument("Path cannot contain NUL".to_string()));
    }
    if key.starts_with(SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "Path must not start with a separator: {}",
            key
        )));
    }
    if key.is_empty() {
        return Ok(());
    }

    let body = key.strip_suffix(SEPARATOR).unwrap_or(key);
    for segment in body.split(SEPARATOR) {
        match segment {
            "" => {
                return Err(Error::InvalidArgument(format!(
                    "Path contains an empty segment: {}",
                    key
                )))
            }
            "." | ".." => {
                return Err(Error::InvalidArgument(format!(
                    "Path cannot contain '{}' segments: {}",
                    segment, key
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Normalize a caller path and validate the result.
pub fn normalize_checked(path: &str) -> Result<&str> {
    let key = normalize(path);
    validate_key(key)?;
    Ok(key)
}
