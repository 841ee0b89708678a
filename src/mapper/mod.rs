//! Storage backend contract.
//!
//! A mapper owns a node set and exposes the full capability surface the
//! controller drives. Any backend implementing [`Mapper`] can be substituted
//! without controller changes. Backends do not assume controller-side
//! validation has happened; each operation re-checks its own preconditions.

pub mod memory;

pub use memory::MemoryMapper;

use crate::error::StorageError;
use crate::node::{Node, NodeValue};
use crate::search::SearchCriteria;

/// Pluggable storage backend for the node tree.
pub trait Mapper: Send + Sync {
    /// Fetch the node at `path`, or its tombstone view if the slot was
    /// soft-deleted. Fails `NotFound` if the path was never populated.
    fn get(&self, full_path: &str) -> Result<Node, StorageError>;

    /// Insert a new live node. Fails `AlreadyExists` when a live node holds
    /// the path, `ParentMissing` when a non-empty parent path is absent, and
    /// `InvalidNode` for placeholder or malformed nodes. Overwrites a
    /// tombstone occupying the same path.
    fn add(&self, node: &Node) -> Result<(), StorageError>;

    /// Replace owner, visibility, and values of the stored node. The child
    /// set stays backend-maintained. Fails `NotFound` if the target or its
    /// parent is absent.
    fn update(&self, node: &Node) -> Result<(), StorageError>;

    /// Soft-delete the node at `path`, leaving a tombstone and detaching the
    /// node from its parent's child set. Returns the removed node. Fails
    /// `HasChildren` while the child set is non-empty.
    fn delete(&self, full_path: &str) -> Result<Node, StorageError>;

    /// Move the subtree rooted at `old_path` to `new_path`, preserving
    /// owner, visibility, and values at every level.
    ///
    /// The cascade runs as a sequence of independent add/delete steps, each
    /// taking the table lock on its own; concurrent readers may observe a
    /// partially moved subtree.
    fn rename(&self, old_path: &str, new_path: &str) -> Result<(), StorageError>;

    /// Fetch one value from a node. Fails `NotFound` if the node is absent,
    /// tombstoned, or does not hold the key.
    fn get_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError>;

    /// Attach a new value to a node. Fails `AlreadyExists` when the key is
    /// already present.
    fn add_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError>;

    /// Replace the value matching `value`'s key. All fields except the key
    /// are taken from the replacement.
    fn update_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError>;

    /// Detach and return the value stored under `key`.
    fn remove_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError>;

    /// All live nodes matching `criteria`, in unspecified order. Tombstones
    /// are never returned.
    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Node>, StorageError>;

    /// Persist pending state to the backing store, if any.
    fn flush(&self) -> Result<(), StorageError>;

    /// Flush and release backend resources.
    fn close(&self) -> Result<(), StorageError>;

    /// Irreversibly clear all stored data.
    fn zap(&self) -> Result<(), StorageError>;
}
