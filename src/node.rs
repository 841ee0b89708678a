//! Tree node and attribute value types.
//!
//! A [`Node`] is a path-addressed tree entity carrying an owner, an ordered
//! sensitivity classification, and a map of typed key/value attributes.
//! Deleted nodes leave a tombstone behind: a marker that occupies the same
//! path, preserves visibility, and carries no values or children.

use crate::error::StorageError;
use crate::path;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ordered sensitivity classification, most restrictive first.
///
/// Follows the traffic-light scheme: `Red` is the most restrictive level and
/// the default for newly created nodes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Visibility {
    #[default]
    Red,
    Amber,
    Green,
    White,
}

impl Visibility {
    /// Canonical wire form of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Red => "RED",
            Visibility::Amber => "AMBER",
            Visibility::Green => "GREEN",
            Visibility::White => "WHITE",
        }
    }

    /// Parse the canonical form back into a level.
    pub fn parse(s: &str) -> Option<Visibility> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Some(Visibility::Red),
            "AMBER" => Some(Visibility::Amber),
            "GREEN" => Some(Visibility::Green),
            "WHITE" => Some(Visibility::White),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, possibly multi-locale attribute attached to a node.
///
/// The type tag is a free-form string; it is matched by search criteria but
/// not otherwise interpreted. The primary payload may carry locale-qualified
/// variants for multi-language content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeValue {
    key: String,
    value_type: String,
    value: String,
    locales: BTreeMap<String, String>,
    last_modified: String,
}

impl NodeValue {
    /// Create an untyped value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_type(key, value, "")
    }

    /// Create a value with an explicit type tag.
    pub fn with_type(
        key: impl Into<String>,
        value: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        NodeValue {
            key: key.into(),
            value_type: value_type.into(),
            value: value.into(),
            locales: BTreeMap::new(),
            last_modified: now_millis(),
        }
    }

    /// Rebuild a value from persisted fields, keeping its original timestamp.
    pub(crate) fn restore(
        key: String,
        value_type: String,
        value: String,
        last_modified: String,
        locales: BTreeMap<String, String>,
    ) -> Self {
        NodeValue {
            key,
            value_type,
            value,
            locales,
            last_modified,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Last-modification timestamp as epoch milliseconds.
    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.touch();
    }

    pub fn set_value_type(&mut self, value_type: impl Into<String>) {
        self.value_type = value_type.into();
        self.touch();
    }

    /// Attach or replace a locale-qualified variant of the payload.
    pub fn set_locale(&mut self, locale: impl Into<String>, text: impl Into<String>) {
        self.locales.insert(locale.into(), text.into());
        self.touch();
    }

    /// The variant for `locale`, falling back to the primary payload.
    pub fn localized(&self, locale: &str) -> &str {
        match self.locales.get(locale) {
            Some(text) => text,
            None => &self.value,
        }
    }

    pub fn locales(&self) -> &BTreeMap<String, String> {
        &self.locales
    }

    fn touch(&mut self) {
        self.last_modified = now_millis();
    }
}

fn now_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// A path-addressed tree entity.
///
/// The name and parent path are derived from the full path; the child set
/// holds immediate child names only and is maintained by the storage backend
/// as nodes are added and deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    path: String,
    owner: String,
    visibility: Visibility,
    values: BTreeMap<String, NodeValue>,
    children: BTreeSet<String>,
    tombstone: bool,
}

impl Node {
    /// Create a live node named `name` under `parent_path`.
    ///
    /// An empty parent path creates a root-level node.
    pub fn new(name: &str, parent_path: &str) -> Result<Self, StorageError> {
        path::validate_name(name)?;
        if !parent_path.is_empty() {
            path::validate(parent_path)?;
        }
        Ok(Self::live(path::join(parent_path, name)))
    }

    /// Create a live node from a fully qualified path.
    pub fn from_path(full_path: &str) -> Result<Self, StorageError> {
        path::validate(full_path)?;
        Ok(Self::live(full_path.to_string()))
    }

    fn live(full_path: String) -> Self {
        Node {
            path: full_path,
            owner: String::new(),
            visibility: Visibility::default(),
            values: BTreeMap::new(),
            children: BTreeSet::new(),
            tombstone: false,
        }
    }

    /// Create the tombstone view of a deleted slot: same path, preserved
    /// visibility, no owner, values, or children.
    pub fn tombstone(full_path: &str, visibility: Visibility) -> Self {
        Node {
            path: full_path.to_string(),
            owner: String::new(),
            visibility,
            values: BTreeMap::new(),
            children: BTreeSet::new(),
            tombstone: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        path::name_of(&self.path)
    }

    /// The enclosing path; empty for root-level nodes.
    pub fn parent_path(&self) -> &str {
        path::parent_of(&self.path)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    pub fn values(&self) -> &BTreeMap<String, NodeValue> {
        &self.values
    }

    pub fn value(&self, key: &str) -> Option<&NodeValue> {
        self.values.get(key)
    }

    /// Insert or replace a value, returning the previous one if any.
    pub fn put_value(&mut self, value: NodeValue) -> Option<NodeValue> {
        self.values.insert(value.key.clone(), value)
    }

    /// Remove and return the value stored under `key`.
    pub fn take_value(&mut self, key: &str) -> Option<NodeValue> {
        self.values.remove(key)
    }

    /// Immediate child names.
    pub fn children(&self) -> &BTreeSet<String> {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn add_child(&mut self, name: impl Into<String>) {
        self.children.insert(name.into());
    }

    pub fn remove_child(&mut self, name: &str) {
        self.children.remove(name);
    }

    /// Replace all mutable fields from `other`, keeping identity and the
    /// backend-maintained child set.
    pub(crate) fn merge_from(&mut self, other: &Node) {
        self.owner = other.owner.clone();
        self.visibility = other.visibility;
        self.values = other.values.clone();
    }
}
