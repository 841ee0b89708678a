//! Arbor: Embeddable Hierarchical Key/Value Storage
//!
//! A tree of named, owned, path-addressed nodes, each carrying typed
//! key/value attributes, persisted through a pluggable mapper backend.
//! Supports soft deletion via tombstones, cascading subtree renames,
//! predicate-based search, and a length-prefixed binary record format with
//! bookend corruption detection.

pub mod controller;
pub mod error;
pub mod mapper;
pub mod node;
pub mod path;
pub mod search;
pub mod snapshot;
pub mod wire;
