//! Storage error types.
//!
//! All controller and mapper violations surface synchronously as typed
//! failures. The background snapshot task is the sole exception: its
//! write/read failures are logged and never reach a foreground caller.

use thiserror::Error;

/// Errors raised by controller, mapper, and codec operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed node or value key is absent.
    #[error("node not found: {0}")]
    NotFound(String),

    /// An add or rename target path is already occupied by a live node.
    #[error("node already exists: {0}")]
    AlreadyExists(String),

    /// A non-root node was added or moved below a path that does not exist.
    #[error("parent node \"{0}\" does not exist")]
    ParentMissing(String),

    /// Deletion was blocked by a non-empty child set.
    #[error("node has children, cannot remove: {0}")]
    HasChildren(String),

    /// The node is structurally unusable (placeholder, malformed path).
    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// A serialized record failed marker or framing checks.
    #[error("malformed record stream: {0}")]
    StreamFormat(String),

    /// A search criteria pattern failed to compile.
    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Underlying I/O failure while reading or writing a snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
