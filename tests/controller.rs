//! End-to-end controller behavior over the in-memory mapper.

use arbor::controller::Controller;
use arbor::error::StorageError;
use arbor::mapper::MemoryMapper;
use arbor::node::{Node, NodeValue, Visibility};
use arbor::search::{Field, SearchCriteria};

fn controller() -> Controller {
    Controller::new("testOwner", Box::new(MemoryMapper::new()))
}

#[test]
fn owner_is_set_upon_adding() {
    let controller = controller();
    controller.add(&Node::new("testNode1", "").unwrap()).unwrap();

    let stored = controller.get(":testNode1").unwrap();
    assert_eq!(stored.owner(), "testOwner");
}

#[test]
fn root_node_create_defaults() {
    let controller = controller();
    controller.add(&Node::new("testNode1", "").unwrap()).unwrap();

    let stored = controller.get(":testNode1").unwrap();
    assert_eq!(stored.owner(), "testOwner");
    assert_eq!(stored.name(), "testNode1");
    assert_eq!(stored.path(), ":testNode1");
    assert_eq!(stored.visibility(), Visibility::Red);
}

#[test]
fn nested_node_add() {
    let controller = controller();
    controller.add(&Node::new("parent1", "").unwrap()).unwrap();
    controller.add(&Node::new("name2", ":parent1").unwrap()).unwrap();

    let stored = controller.get(":parent1:name2").unwrap();
    assert_eq!(stored.owner(), "testOwner");
    assert_eq!(stored.name(), "name2");
    assert_eq!(stored.path(), ":parent1:name2");
    assert_eq!(stored.visibility(), Visibility::Red);
}

#[test]
fn update_replaces_ordinals_and_keeps_child_set() {
    let controller = controller();
    controller.add(&Node::new("parent1", "").unwrap()).unwrap();

    let mut node = Node::new("testNode1", ":parent1").unwrap();
    node.set_visibility(Visibility::Green);
    controller.add(&node).unwrap();
    controller
        .add(&Node::new("testChild1", ":parent1:testNode1").unwrap())
        .unwrap();

    node.set_visibility(Visibility::Red);
    controller.update(&node).unwrap();

    let stored = controller.get(":parent1:testNode1").unwrap();
    assert_eq!(stored.owner(), "testOwner");
    assert_eq!(stored.name(), "testNode1");
    assert_eq!(stored.path(), ":parent1:testNode1");
    assert_eq!(stored.visibility(), Visibility::Red);
    assert!(stored.children().contains("testChild1"));
}

#[test]
fn parent_precondition_and_value_update() {
    let controller = controller();

    // Adding below a missing parent must fail before the parent exists.
    assert!(matches!(
        controller.add(&Node::new("testNode1", ":parent1").unwrap()),
        Err(StorageError::ParentMissing(_))
    ));

    controller.add(&Node::new("parent1", "").unwrap()).unwrap();
    controller.add(&Node::new("testNode1", ":parent1").unwrap()).unwrap();

    controller
        .add_value(":parent1:testNode1", NodeValue::new("key1", "valueFirst"))
        .unwrap();
    controller
        .update_value(":parent1:testNode1", NodeValue::new("key1", "valueSecond"))
        .unwrap();

    let stored = controller.get(":parent1:testNode1").unwrap();
    assert_eq!(stored.value("key1").unwrap().value(), "valueSecond");

    // Removing the parent while the child exists is blocked.
    assert!(matches!(
        controller.delete(":parent1"),
        Err(StorageError::HasChildren(_))
    ));

    controller.delete(":parent1:testNode1").unwrap();
    controller.delete(":parent1").unwrap();
}

#[test]
fn delete_returns_node_and_leaves_tombstone() {
    let controller = controller();
    controller.add(&Node::new("parent1", "").unwrap()).unwrap();

    let mut node = Node::new("name1", ":parent1").unwrap();
    node.set_visibility(Visibility::Amber);
    node.put_value(NodeValue::new("key", "value"));
    controller.add(&node).unwrap();

    let removed = controller.delete(":parent1:name1").unwrap();
    assert_eq!(removed.value("key").unwrap().value(), "value");
    assert_eq!(removed.visibility(), Visibility::Amber);
    assert!(!removed.is_tombstone());

    let stone = controller.get(":parent1:name1").unwrap();
    assert!(stone.is_tombstone());
    assert_eq!(stone.visibility(), Visibility::Amber);
    assert!(stone.values().is_empty());
    assert!(!stone.has_children());

    assert!(matches!(
        controller.get_value(":parent1:name1", "key"),
        Err(StorageError::NotFound(_))
    ));
    assert!(!controller.get(":parent1").unwrap().children().contains("name1"));
}

#[test]
fn delete_with_child_is_rejected() {
    let controller = controller();
    controller.add(&Node::new("parent1", "").unwrap()).unwrap();
    controller.add(&Node::new("name1", ":parent1").unwrap()).unwrap();
    controller
        .add(&Node::new("child1", ":parent1:name1").unwrap())
        .unwrap();

    assert!(matches!(
        controller.delete(":parent1:name1"),
        Err(StorageError::HasChildren(_))
    ));

    // The node is untouched by the failed delete.
    let stored = controller.get(":parent1:name1").unwrap();
    assert!(!stored.is_tombstone());
    assert!(stored.children().contains("child1"));
}

#[test]
fn rename_by_name_and_by_path() {
    let controller = controller();
    for (name, parent) in [
        ("renameTests", ""),
        ("name1", ":renameTests"),
        ("name11", ":renameTests:name1"),
        ("name2", ":renameTests"),
        ("name21", ":renameTests:name2"),
        ("name3", ":renameTests"),
    ] {
        controller.add(&Node::new(name, parent).unwrap()).unwrap();
    }

    // Rename by bare name, then by absolute path.
    controller.rename(":renameTests:name1", "name1a").unwrap();
    controller
        .rename(":renameTests:name2", ":renameTests:name2a")
        .unwrap();

    // Old slots are vacated.
    assert!(controller.get(":renameTests:name1").unwrap().is_tombstone());
    assert!(controller.get(":renameTests:name2").unwrap().is_tombstone());

    // New nodes carry the new name and path.
    assert_eq!(controller.get(":renameTests:name1a").unwrap().name(), "name1a");
    assert_eq!(controller.get(":renameTests:name2a").unwrap().name(), "name2a");
    assert_eq!(
        controller.get(":renameTests:name1a").unwrap().path(),
        ":renameTests:name1a"
    );

    // Descendants moved along.
    assert_eq!(
        controller.get(":renameTests:name1a:name11").unwrap().name(),
        "name11"
    );
    assert_eq!(
        controller.get(":renameTests:name2a:name21").unwrap().path(),
        ":renameTests:name2a:name21"
    );

    // Renaming something that does not exist fails either way.
    assert!(matches!(
        controller.rename(":renameTests:name4", ":renameTests:name4a"),
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        controller.rename(":renameTests:name4", "name4a"),
        Err(StorageError::NotFound(_))
    ));

    // Renaming onto an occupied path fails either way.
    assert!(matches!(
        controller.rename(":renameTests:name2a", ":renameTests:name3"),
        Err(StorageError::AlreadyExists(_))
    ));
    assert!(matches!(
        controller.rename(":renameTests:name2a", "name3"),
        Err(StorageError::AlreadyExists(_))
    ));
}

#[test]
fn rename_preserves_values_everywhere() {
    let controller = controller();
    let mut roots = Node::new("renameTests", "").unwrap();
    roots.put_value(NodeValue::new("key", "value"));
    controller.add(&roots).unwrap();

    let mut name1 = Node::new("name1", ":renameTests").unwrap();
    name1.put_value(NodeValue::new("key1", "value1"));
    controller.add(&name1).unwrap();

    let mut name2 = Node::new("name2", ":renameTests").unwrap();
    name2.put_value(NodeValue::new("key2", "value2"));
    controller.add(&name2).unwrap();

    let mut name21 = Node::new("name21", ":renameTests:name2").unwrap();
    name21.put_value(NodeValue::new("key21", "value21"));
    controller.add(&name21).unwrap();

    controller
        .rename(":renameTests:name2", ":renameTests:name2a")
        .unwrap();

    assert!(controller.get(":renameTests:name2").unwrap().is_tombstone());
    assert_eq!(controller.get(":renameTests:name2a").unwrap().name(), "name2a");

    // Values survive on the parent, the untouched sibling, the moved node,
    // and the moved descendant.
    assert_eq!(
        controller.get(":renameTests").unwrap().value("key").unwrap().value(),
        "value"
    );
    assert_eq!(
        controller
            .get(":renameTests:name1")
            .unwrap()
            .value("key1")
            .unwrap()
            .value(),
        "value1"
    );
    assert_eq!(
        controller
            .get(":renameTests:name2a")
            .unwrap()
            .value("key2")
            .unwrap()
            .value(),
        "value2"
    );
    assert_eq!(
        controller
            .get(":renameTests:name2a:name21")
            .unwrap()
            .value("key21")
            .unwrap()
            .value(),
        "value21"
    );

    // The vacated slots no longer serve values.
    assert!(matches!(
        controller.get_value(":renameTests:name2", "key2"),
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        controller.get_value(":renameTests:name2:name21", "key21"),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn search_through_controller() {
    let controller = controller();
    controller.add(&Node::new("devices", "").unwrap()).unwrap();

    let mut sensor = Node::new("sensor1", ":devices").unwrap();
    sensor.put_value(NodeValue::with_type("k1", "v1", "typeA"));
    sensor.put_value(NodeValue::with_type("k2", "v2", "typeB"));
    controller.add(&sensor).unwrap();

    let mut ghost = Node::new("ghost", ":devices").unwrap();
    ghost.put_value(NodeValue::with_type("k3", "v3", "typeB"));
    controller.add(&ghost).unwrap();
    controller.delete(":devices:ghost").unwrap();

    let mut criteria = SearchCriteria::new();
    criteria.set(Field::Type, "typeB");
    let hits = controller.search(&criteria).unwrap();
    assert_eq!(hits.len(), 1, "tombstoned node must not match");
    assert_eq!(hits[0].path(), ":devices:sensor1");

    criteria.set(Field::Type, "typeC");
    assert!(controller.search(&criteria).unwrap().is_empty());

    let mut keyed = SearchCriteria::new();
    keyed.set(Field::Key, "k1");
    keyed.set(Field::Value, "v1");
    assert_eq!(controller.search(&keyed).unwrap().len(), 1);

    keyed.set(Field::Value, "nomatch");
    assert!(controller.search(&keyed).unwrap().is_empty());
}

#[test]
fn zap_resets_the_store() {
    let controller = controller();
    controller.add(&Node::new("a", "").unwrap()).unwrap();
    controller.add(&Node::new("b", ":a").unwrap()).unwrap();
    controller.zap().unwrap();

    assert!(matches!(
        controller.get(":a"),
        Err(StorageError::NotFound(_))
    ));
    controller.add(&Node::new("a", "").unwrap()).unwrap();
}
