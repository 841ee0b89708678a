//! Colon-delimited path handling.
//!
//! Every fully qualified path starts with the delimiter and names each
//! ancestor segment in order, e.g. `:devices:sensor1`. Root-level nodes have
//! an empty parent path.

use crate::error::StorageError;

/// Separator between path segments. A leading delimiter marks an absolute
/// path from the conceptual root.
pub const DELIMITER: char = ':';

/// Join a parent path and a segment name into a child path.
///
/// An empty parent produces a root-level path (`:name`).
pub fn join(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, DELIMITER, name)
}

/// The last segment of a path.
pub fn name_of(path: &str) -> &str {
    match path.rfind(DELIMITER) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the last segment; empty for root-level paths.
pub fn parent_of(path: &str) -> &str {
    match path.rfind(DELIMITER) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Validate a fully qualified path: leading delimiter, no empty segments.
pub fn validate(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidNode("empty path".to_string()));
    }
    if !path.starts_with(DELIMITER) {
        return Err(StorageError::InvalidNode(format!(
            "path must be fully qualified: {}",
            path
        )));
    }
    if path[1..].split(DELIMITER).any(str::is_empty) {
        return Err(StorageError::InvalidNode(format!(
            "path contains an empty segment: {}",
            path
        )));
    }
    Ok(())
}

/// Validate a single segment name (no delimiter, non-empty).
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidNode("empty node name".to_string()));
    }
    if name.contains(DELIMITER) {
        return Err(StorageError::InvalidNode(format!(
            "node name contains the path delimiter: {}",
            name
        )));
    }
    Ok(())
}
