//! In-memory reference mapper.
//!
//! Keys nodes by path in a single table guarded by one coarse lock; every
//! operation takes the lock once, mutates, and releases. Parent→child
//! linkage is kept as child-name sets inside the stored parents, updated on
//! add and delete. Optionally persists the whole table to a snapshot file on
//! a background interval.

use crate::error::StorageError;
use crate::mapper::Mapper;
use crate::node::{Node, NodeValue, Visibility};
use crate::path;
use crate::search::SearchCriteria;
use crate::snapshot::{self, SnapshotConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Storage state of one path slot. A tombstone keeps only the visibility of
/// the node it replaced; values and children are unrepresentable on it.
#[derive(Debug, Clone)]
enum NodeState {
    Active(Node),
    Tombstone { visibility: Visibility },
}

type Table = HashMap<String, NodeState>;

struct SnapshotRunner {
    config: SnapshotConfig,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Non-distributed, table-backed mapper; the reference [`Mapper`]
/// implementation.
pub struct MemoryMapper {
    table: Arc<Mutex<Table>>,
    snapshot: Option<SnapshotRunner>,
}

impl MemoryMapper {
    /// A purely in-memory mapper with no persistence.
    pub fn new() -> Self {
        MemoryMapper {
            table: Arc::new(Mutex::new(HashMap::new())),
            snapshot: None,
        }
    }

    /// A mapper that restores from `config.path` and rewrites the snapshot
    /// on a background interval.
    ///
    /// The restore scan runs to completion before the mapper is returned; no
    /// operations are served mid-restore. A corrupt or unreadable snapshot
    /// degrades to an empty store with a warning.
    pub fn with_snapshot(config: SnapshotConfig) -> Result<Self, StorageError> {
        let restored = match snapshot::read_snapshot(&config.path) {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(error = %err, path = %config.path.display(), "snapshot unreadable, starting empty");
                Vec::new()
            }
        };
        let mut table = HashMap::new();
        for node in restored {
            let slot = node.path().to_string();
            let state = if node.is_tombstone() {
                NodeState::Tombstone {
                    visibility: node.visibility(),
                }
            } else {
                NodeState::Active(node)
            };
            table.insert(slot, state);
        }
        info!(restored = table.len(), path = %config.path.display(), "mapper restored from snapshot");

        let table = Arc::new(Mutex::new(table));
        let runner = spawn_snapshot_thread(&table, config)?;
        Ok(MemoryMapper {
            table,
            snapshot: Some(runner),
        })
    }

    fn write_snapshot_now(&self) -> Result<(), StorageError> {
        if let Some(runner) = &self.snapshot {
            let view = table_view(&self.table.lock());
            snapshot::write_snapshot(&runner.config.path, &view)?;
        }
        Ok(())
    }

    fn stop_snapshot_thread(&self) {
        if let Some(runner) = &self.snapshot {
            // Dropping the sender disconnects the channel and ends the loop.
            runner.shutdown.lock().take();
            if let Some(handle) = runner.handle.lock().take() {
                if handle.join().is_err() {
                    warn!("snapshot thread panicked during shutdown");
                }
            }
        }
    }
}

impl Default for MemoryMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryMapper {
    fn drop(&mut self) {
        self.stop_snapshot_thread();
    }
}

fn spawn_snapshot_thread(
    table: &Arc<Mutex<Table>>,
    config: SnapshotConfig,
) -> Result<SnapshotRunner, StorageError> {
    let (tx, rx) = mpsc::channel::<()>();
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let thread_table = Arc::clone(table);
    let thread_path = config.path.clone();

    let handle = thread::Builder::new()
        .name("arbor-snapshot".to_string())
        .spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let view = table_view(&thread_table.lock());
                    if let Err(err) = snapshot::write_snapshot(&thread_path, &view) {
                        warn!(error = %err, "background snapshot failed, keeping in-memory state");
                    }
                }
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        })?;

    Ok(SnapshotRunner {
        config,
        shutdown: Mutex::new(Some(tx)),
        handle: Mutex::new(Some(handle)),
    })
}

/// Render the table as persistable nodes, tombstones included, ordered by
/// path for stable snapshots.
fn table_view(table: &Table) -> Vec<Node> {
    let mut nodes: Vec<Node> = table
        .iter()
        .map(|(slot, state)| match state {
            NodeState::Active(node) => node.clone(),
            NodeState::Tombstone { visibility } => Node::tombstone(slot, *visibility),
        })
        .collect();
    nodes.sort_by(|a, b| a.path().cmp(b.path()));
    nodes
}

impl Mapper for MemoryMapper {
    fn get(&self, full_path: &str) -> Result<Node, StorageError> {
        path::validate(full_path)?;
        let table = self.table.lock();
        match table.get(full_path) {
            Some(NodeState::Active(node)) => Ok(node.clone()),
            Some(NodeState::Tombstone { visibility }) => {
                Ok(Node::tombstone(full_path, *visibility))
            }
            None => Err(StorageError::NotFound(full_path.to_string())),
        }
    }

    fn add(&self, node: &Node) -> Result<(), StorageError> {
        path::validate(node.path())?;
        if node.is_tombstone() {
            return Err(StorageError::InvalidNode(format!(
                "placeholder node cannot be added: {}",
                node.path()
            )));
        }
        let mut table = self.table.lock();
        if let Some(NodeState::Active(_)) = table.get(node.path()) {
            return Err(StorageError::AlreadyExists(node.path().to_string()));
        }
        let parent_path = node.parent_path();
        if !parent_path.is_empty() {
            match table.get_mut(parent_path) {
                Some(NodeState::Active(parent)) => parent.add_child(node.name()),
                _ => return Err(StorageError::ParentMissing(parent_path.to_string())),
            }
        }
        // A tombstone occupying the slot is simply overwritten.
        table.insert(node.path().to_string(), NodeState::Active(node.clone()));
        debug!(path = node.path(), "node added");
        Ok(())
    }

    fn update(&self, node: &Node) -> Result<(), StorageError> {
        path::validate(node.path())?;
        if node.is_tombstone() {
            return Err(StorageError::InvalidNode(format!(
                "placeholder node cannot be stored: {}",
                node.path()
            )));
        }
        let mut table = self.table.lock();
        let parent_path = node.parent_path();
        if !parent_path.is_empty() && !matches!(table.get(parent_path), Some(NodeState::Active(_)))
        {
            return Err(StorageError::NotFound(parent_path.to_string()));
        }
        match table.get_mut(node.path()) {
            Some(NodeState::Active(stored)) => {
                stored.merge_from(node);
                debug!(path = node.path(), "node updated");
                Ok(())
            }
            _ => Err(StorageError::NotFound(node.path().to_string())),
        }
    }

    fn delete(&self, full_path: &str) -> Result<Node, StorageError> {
        path::validate(full_path)?;
        let mut table = self.table.lock();
        match table.get(full_path) {
            Some(NodeState::Active(node)) => {
                if node.has_children() {
                    return Err(StorageError::HasChildren(full_path.to_string()));
                }
            }
            _ => return Err(StorageError::NotFound(full_path.to_string())),
        }
        let removed = match table.remove(full_path) {
            Some(NodeState::Active(node)) => node,
            _ => return Err(StorageError::NotFound(full_path.to_string())),
        };
        table.insert(
            full_path.to_string(),
            NodeState::Tombstone {
                visibility: removed.visibility(),
            },
        );
        if !removed.parent_path().is_empty() {
            if let Some(NodeState::Active(parent)) = table.get_mut(removed.parent_path()) {
                parent.remove_child(removed.name());
            }
        }
        debug!(path = full_path, "node tombstoned");
        Ok(removed)
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<(), StorageError> {
        path::validate(old_path)?;
        path::validate(new_path)?;
        if old_path == new_path
            || new_path.starts_with(&format!("{}{}", old_path, path::DELIMITER))
        {
            return Err(StorageError::InvalidNode(format!(
                "cannot move {} onto or beneath itself",
                old_path
            )));
        }

        // Preflight and plan under one lock so an impossible rename fails
        // before any slot changes.
        let plan: Vec<(String, String)> = {
            let table = self.table.lock();
            if !matches!(table.get(old_path), Some(NodeState::Active(_))) {
                return Err(StorageError::NotFound(old_path.to_string()));
            }
            if let Some(NodeState::Active(_)) = table.get(new_path) {
                return Err(StorageError::AlreadyExists(new_path.to_string()));
            }
            let new_parent = path::parent_of(new_path);
            if !new_parent.is_empty()
                && !matches!(table.get(new_parent), Some(NodeState::Active(_)))
            {
                return Err(StorageError::ParentMissing(new_parent.to_string()));
            }

            let mut plan = Vec::new();
            let mut stack = vec![(old_path.to_string(), new_path.to_string())];
            while let Some((old, new)) = stack.pop() {
                if let Some(NodeState::Active(node)) = table.get(&old) {
                    for child in node.children() {
                        stack.push((path::join(&old, child), path::join(&new, child)));
                    }
                }
                plan.push((old, new));
            }
            plan
        };

        // Re-home the subtree parents-first. Each step takes the table lock
        // on its own, so concurrent readers may observe a partial move.
        for (old, new) in &plan {
            let source = {
                let table = self.table.lock();
                match table.get(old) {
                    Some(NodeState::Active(node)) => node.clone(),
                    _ => return Err(StorageError::NotFound(old.clone())),
                }
            };
            let mut moved = Node::from_path(new)?;
            moved.set_owner(source.owner());
            moved.set_visibility(source.visibility());
            for value in source.values().values() {
                moved.put_value(value.clone());
            }
            self.add(&moved)?;
        }

        // Vacate the old slots deepest-first so no delete sees children.
        for (old, _) in plan.iter().rev() {
            self.delete(old)?;
        }
        debug!(source = old_path, target = new_path, moved = plan.len(), "subtree renamed");
        Ok(())
    }

    fn get_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError> {
        path::validate(full_path)?;
        let table = self.table.lock();
        match table.get(full_path) {
            Some(NodeState::Active(node)) => node
                .value(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("{} [{}]", full_path, key))),
            _ => Err(StorageError::NotFound(full_path.to_string())),
        }
    }

    fn add_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError> {
        path::validate(full_path)?;
        let mut table = self.table.lock();
        match table.get_mut(full_path) {
            Some(NodeState::Active(node)) => {
                if node.value(value.key()).is_some() {
                    return Err(StorageError::AlreadyExists(format!(
                        "{} [{}]",
                        full_path,
                        value.key()
                    )));
                }
                node.put_value(value);
                Ok(())
            }
            _ => Err(StorageError::NotFound(full_path.to_string())),
        }
    }

    fn update_value(&self, full_path: &str, value: NodeValue) -> Result<(), StorageError> {
        path::validate(full_path)?;
        let mut table = self.table.lock();
        match table.get_mut(full_path) {
            Some(NodeState::Active(node)) => {
                if node.value(value.key()).is_none() {
                    return Err(StorageError::NotFound(format!(
                        "{} [{}]",
                        full_path,
                        value.key()
                    )));
                }
                node.put_value(value);
                Ok(())
            }
            _ => Err(StorageError::NotFound(full_path.to_string())),
        }
    }

    fn remove_value(&self, full_path: &str, key: &str) -> Result<NodeValue, StorageError> {
        path::validate(full_path)?;
        let mut table = self.table.lock();
        match table.get_mut(full_path) {
            Some(NodeState::Active(node)) => node
                .take_value(key)
                .ok_or_else(|| StorageError::NotFound(format!("{} [{}]", full_path, key))),
            _ => Err(StorageError::NotFound(full_path.to_string())),
        }
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Node>, StorageError> {
        let table = self.table.lock();
        let mut hits = Vec::new();
        for state in table.values() {
            if let NodeState::Active(node) = state {
                if criteria.evaluate(node)? {
                    hits.push(node.clone());
                }
            }
        }
        Ok(hits)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.write_snapshot_now()
    }

    fn close(&self) -> Result<(), StorageError> {
        self.stop_snapshot_thread();
        self.write_snapshot_now()
    }

    fn zap(&self) -> Result<(), StorageError> {
        self.table.lock().clear();
        info!("storage zapped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Field;

    fn add_node(mapper: &MemoryMapper, name: &str, parent: &str) -> Node {
        let node = Node::new(name, parent).unwrap();
        mapper.add(&node).unwrap();
        node
    }

    #[test]
    fn test_get_returns_a_snapshot_clone() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");

        let mut fetched = mapper.get(":root").unwrap();
        fetched.set_owner("intruder");
        assert_eq!(mapper.get(":root").unwrap().owner(), "");
    }

    #[test]
    fn test_add_requires_existing_parent() {
        let mapper = MemoryMapper::new();
        let orphan = Node::new("child", ":missing").unwrap();
        assert!(matches!(
            mapper.add(&orphan),
            Err(StorageError::ParentMissing(_))
        ));

        add_node(&mapper, "missing", "");
        mapper.add(&orphan).unwrap();
        assert!(mapper.get(":missing").unwrap().children().contains("child"));
    }

    #[test]
    fn test_add_rejects_placeholder_nodes() {
        let mapper = MemoryMapper::new();
        let stone = Node::tombstone(":ghost", Visibility::Red);
        assert!(matches!(
            mapper.add(&stone),
            Err(StorageError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_delete_leaves_tombstone_and_detaches_parent() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        let mut child = Node::new("child", ":root").unwrap();
        child.set_visibility(Visibility::Green);
        child.put_value(NodeValue::new("k", "v"));
        mapper.add(&child).unwrap();

        let removed = mapper.delete(":root:child").unwrap();
        assert_eq!(removed.value("k").unwrap().value(), "v");

        let stone = mapper.get(":root:child").unwrap();
        assert!(stone.is_tombstone());
        assert_eq!(stone.visibility(), Visibility::Green);
        assert!(stone.values().is_empty());

        assert!(!mapper.get(":root").unwrap().children().contains("child"));
        assert!(matches!(
            mapper.get_value(":root:child", "k"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_of_tombstone_is_not_found() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        mapper.delete(":root").unwrap();
        assert!(matches!(
            mapper.delete(":root"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_overwrites_tombstone() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        mapper.delete(":root").unwrap();

        let mut revived = Node::new("root", "").unwrap();
        revived.set_owner("bob");
        mapper.add(&revived).unwrap();
        let fetched = mapper.get(":root").unwrap();
        assert!(!fetched.is_tombstone());
        assert_eq!(fetched.owner(), "bob");
    }

    #[test]
    fn test_delete_with_children_is_blocked() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        add_node(&mapper, "child", ":root");

        assert!(matches!(
            mapper.delete(":root"),
            Err(StorageError::HasChildren(_))
        ));
        mapper.delete(":root:child").unwrap();
        mapper.delete(":root").unwrap();
    }

    #[test]
    fn test_rename_moves_values_and_descendants() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        let mut branch = Node::new("branch", ":root").unwrap();
        branch.set_owner("alice");
        branch.set_visibility(Visibility::Amber);
        branch.put_value(NodeValue::new("k", "v"));
        mapper.add(&branch).unwrap();
        let mut leaf = Node::new("leaf", ":root:branch").unwrap();
        leaf.put_value(NodeValue::new("lk", "lv"));
        mapper.add(&leaf).unwrap();

        mapper.rename(":root:branch", ":root:limb").unwrap();

        let moved = mapper.get(":root:limb").unwrap();
        assert_eq!(moved.owner(), "alice");
        assert_eq!(moved.visibility(), Visibility::Amber);
        assert_eq!(moved.value("k").unwrap().value(), "v");
        assert!(moved.children().contains("leaf"));

        let moved_leaf = mapper.get(":root:limb:leaf").unwrap();
        assert_eq!(moved_leaf.value("lk").unwrap().value(), "lv");

        assert!(mapper.get(":root:branch").unwrap().is_tombstone());
        assert!(mapper.get(":root:branch:leaf").unwrap().is_tombstone());
        let root = mapper.get(":root").unwrap();
        assert!(root.children().contains("limb"));
        assert!(!root.children().contains("branch"));
    }

    #[test]
    fn test_rename_collision_and_self_nesting() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "a", "");
        add_node(&mapper, "b", "");

        assert!(matches!(
            mapper.rename(":a", ":b"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            mapper.rename(":a", ":a:inner"),
            Err(StorageError::InvalidNode(_))
        ));
        assert!(matches!(
            mapper.rename(":ghost", ":c"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_value_lifecycle_errors() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "n", "");

        mapper.add_value(":n", NodeValue::new("k", "v1")).unwrap();
        assert!(matches!(
            mapper.add_value(":n", NodeValue::new("k", "v2")),
            Err(StorageError::AlreadyExists(_))
        ));

        mapper
            .update_value(":n", NodeValue::new("k", "v2"))
            .unwrap();
        assert_eq!(mapper.get_value(":n", "k").unwrap().value(), "v2");

        assert!(matches!(
            mapper.update_value(":n", NodeValue::new("other", "v")),
            Err(StorageError::NotFound(_))
        ));

        let removed = mapper.remove_value(":n", "k").unwrap();
        assert_eq!(removed.value(), "v2");
        assert!(matches!(
            mapper.remove_value(":n", "k"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_search_skips_tombstones() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "keep", "");
        add_node(&mapper, "drop", "");
        mapper.delete(":drop").unwrap();

        let hits = mapper.search(&SearchCriteria::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path(), ":keep");
    }

    #[test]
    fn test_search_subtree_filter() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "devices", "");
        add_node(&mapper, "sensor1", ":devices");
        add_node(&mapper, "users", "");

        let mut criteria = SearchCriteria::new();
        criteria.set(Field::Path, ":devices");
        let mut hits: Vec<String> = mapper
            .search(&criteria)
            .unwrap()
            .into_iter()
            .map(|n| n.path().to_string())
            .collect();
        hits.sort();
        assert_eq!(hits, vec![":devices", ":devices:sensor1"]);
    }

    #[test]
    fn test_zap_clears_everything() {
        let mapper = MemoryMapper::new();
        add_node(&mapper, "root", "");
        mapper.zap().unwrap();
        assert!(matches!(
            mapper.get(":root"),
            Err(StorageError::NotFound(_))
        ));
    }
}
