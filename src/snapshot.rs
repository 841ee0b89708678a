//! Snapshot persistence for the in-memory mapper.
//!
//! A snapshot is a flat concatenation of codec-encoded node records with no
//! file header; the file is fully rewritten on each flush. Restore is a
//! best-effort sequential scan: end-of-stream exactly at a record boundary is
//! the normal termination, while a torn record ends the scan at the last
//! valid record instead of propagating.

use crate::error::StorageError;
use crate::node::Node;
use crate::wire;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file location.
    pub path: PathBuf,

    /// Seconds between background flushes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

impl SnapshotConfig {
    /// Snapshot into `path` with the default flush interval.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotConfig {
            path: path.into(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// Rewrite the snapshot file with the given node set.
///
/// The records are staged into a sibling temp file which is renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
pub fn write_snapshot(target: &Path, nodes: &[Node]) -> Result<(), StorageError> {
    let mut buf = Vec::new();
    for node in nodes {
        wire::write_node(&mut buf, node)?;
    }

    let staging = staging_path(target);
    if let Some(dir) = target.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    std::fs::write(&staging, &buf)?;
    std::fs::rename(&staging, target)?;
    debug!(records = nodes.len(), path = %target.display(), "snapshot written");
    Ok(())
}

/// Read back every decodable node record from a snapshot file.
///
/// A missing file yields an empty set. A torn or misframed record stops the
/// scan at the last valid record with a warning.
pub fn read_snapshot(source: &Path) -> Result<Vec<Node>, StorageError> {
    if !source.exists() {
        return Ok(Vec::new());
    }
    let buf = std::fs::read(source)?;
    let mut cursor = Cursor::new(buf.as_slice());
    let mut nodes = Vec::new();
    while (cursor.position() as usize) < buf.len() {
        match wire::read_node(&mut cursor) {
            Ok(node) => nodes.push(node),
            Err(err) => {
                warn!(
                    error = %err,
                    recovered = nodes.len(),
                    path = %source.display(),
                    "snapshot scan stopped at torn record"
                );
                break;
            }
        }
    }
    Ok(nodes)
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
