//! Storage controller.
//!
//! The orchestration layer above a [`Mapper`]: injects the configured
//! default owner, resolves sibling renames to absolute paths, and forwards
//! validated operations to the backend. The controller never bypasses the
//! mapper contract, and the mapper re-checks its own preconditions, so a
//! backend stays safe under direct use as well.

use crate::error::StorageError;
use crate::mapper::Mapper;
use crate::node::{Node, NodeValue};
use crate::path;
use crate::search::SearchCriteria;
use tracing::debug;

/// Validation and orchestration layer enforcing tree invariants above a
/// pluggable storage backend.
pub struct Controller {
    default_owner: String,
    mapper: Box<dyn Mapper>,
}

impl Controller {
    /// Create a controller that stamps `default_owner` onto nodes added
    /// without an explicit owner.
    pub fn new(default_owner: impl Into<String>, mapper: Box<dyn Mapper>) -> Self {
        Controller {
            default_owner: default_owner.into(),
            mapper,
        }
    }

    /// The identity stamped onto ownerless nodes.
    pub fn default_owner(&self) -> &str {
        &self.default_owner
    }

    /// Fetch the node at `path`, or its tombstone view if the slot was
    /// soft-deleted.
    pub fn get(&self, full_path: &str) -> Result<Node, StorageError> {
        self.mapper.get(full_path)
    }

    /// Add a new node, stamping the default owner if none is set. A new
    /// node's visibility defaults to the most restrictive level.
    pub fn add(&self, node: &Node) -> Result<(), StorageError> {
        let mut node = node.clone();
        if node.owner().is_empty() {
            node.set_owner(&self.default_owner);
        }
        self.mapper.add(&node)
    }

    /// Replace owner, visibility, and values of the stored node.
    pub fn update(&self, node: &Node) -> Result<(), StorageError> {
        self.mapper.update(node)
    }

    /// Soft-delete the node at `path`, returning the removed node.
    pub fn delete(&self, full_path: &str) -> Result<Node, StorageError> {
        self.mapper.delete(full_path)
    }

    /// Rename or move a node and its whole subtree.
    ///
    /// A bare segment (no delimiter) renames in place under the same parent;
    /// anything containing the delimiter is taken as the absolute target
    /// path. The cascade is a sequence of add/delete steps, so concurrent
    /// readers may observe a partially moved subtree.
    pub fn rename(&self, old_path: &str, new_name_or_path: &str) -> Result<(), StorageError> {
        let new_path = if new_name_or_path.contains(path::DELIMITER) {
            new_name_or_path.to_string()
        } else {
            path::validate_name(new_name_or_path)?;
            path::join(path::parent_of(old_path), new_name_or_path)
        };
        debug!(source = old_path, target = %new_path, "rename resolved");
        self.mapper.rename(old_path, &new_path)
    }

    /// Fetch one value from a node.
    pub fn get_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError> {
        self.mapper.get_value(full_path, key)
    }

    /// Attach a new value to a node.
    pub fn add_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError> {
        self.mapper.add_value(full_path, value)
    }

    /// Replace the stored value matching the given value's key.
    pub fn update_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError> {
        self.mapper.update_value(full_path, value)
    }

    /// Detach and return the value stored under `key`.
    pub fn remove_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError> {
        self.mapper.remove_value(full_path, key)
    }

    /// All live nodes matching `criteria`, in unspecified order.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Node>, StorageError> {
        self.mapper.search(criteria)
    }

    /// Persist pending state to the backend.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.mapper.flush()
    }

    /// Flush and release backend resources.
    pub fn close(&self) -> Result<(), StorageError> {
        self.mapper.close()
    }

    /// Irreversibly clear all stored data.
    pub fn zap(&self) -> Result<(), StorageError> {
        self.mapper.zap()
    }
}
