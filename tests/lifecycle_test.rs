mod common;

use arbor::util::testing;
use arbor::{LifecycleState, Operation, TreeError, TreeManager};
use common::Task;
use rstest::{fixture, rstest};

#[ctor::ctor]
fn init() {
    testing::init_test_setup();
}

#[fixture]
fn manager() -> TreeManager<u32> {
    common::manager_with_session("a")
}

#[rstest]
fn given_fresh_element_when_persisting_then_copy_comes_back_attached(
    mut manager: TreeManager<u32>,
) {
    let fresh = manager.create_element(5, Some(3), Task::new(5, Some(3)));
    assert_eq!(fresh.state(), LifecycleState::NotExisted);
    assert!(fresh.attached_to().is_none());

    let persisted = manager.persist_element(&fresh).unwrap();
    assert_eq!(persisted.state(), LifecycleState::Attached);
    assert!(!persisted.is_dirty());
    assert_eq!(persisted.attached_to(), Some(&"a".to_string()));
    assert!(manager.contains_id(&3, &5));
}

#[rstest]
fn given_attached_copy_when_persisting_again_then_lifecycle_error(
    mut manager: TreeManager<u32>,
) {
    let attached = manager.get_element_by_id(&3).unwrap();
    let err = manager.persist_element(&attached).unwrap_err();
    assert!(matches!(
        err,
        TreeError::InvalidLifecycleState {
            operation: Operation::Persist,
            state: LifecycleState::Attached,
        }
    ));
}

#[rstest]
fn given_removed_element_when_persisting_then_lifecycle_error(mut manager: TreeManager<u32>) {
    let removed = manager.remove_element_by_id(&3).unwrap();
    assert_eq!(removed.state(), LifecycleState::Detached);
    assert!(!manager.current_tree_contains_id(&3));

    let err = manager.persist_element(&removed).unwrap_err();
    assert!(matches!(
        err,
        TreeError::InvalidLifecycleState {
            operation: Operation::Persist,
            state: LifecycleState::Detached,
        }
    ));
}

#[rstest]
fn given_removed_element_when_updating_then_it_reattaches(mut manager: TreeManager<u32>) {
    let removed = manager.remove_element_by_id(&2).unwrap();
    assert!(!manager.current_tree_contains_id(&2));
    assert!(!manager.current_tree_contains_id(&4));

    let restored = manager.update_element(&removed).unwrap();
    assert_eq!(restored.state(), LifecycleState::Attached);
    assert!(manager.contains_id(&1, &2));
    assert!(manager.contains_id(&2, &4));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_fresh_element_when_updating_then_lifecycle_error(mut manager: TreeManager<u32>) {
    let fresh = manager.create_element(5, None, Task::new(5, None));
    let err = manager.update_element(&fresh).unwrap_err();
    assert!(matches!(
        err,
        TreeError::InvalidLifecycleState {
            operation: Operation::Update,
            state: LifecycleState::NotExisted,
        }
    ));
}

#[rstest]
fn given_stale_attached_copy_when_updating_then_it_reattaches(mut manager: TreeManager<u32>) {
    // copy taken before the element was removed still reports Attached
    let stale = manager.get_element_by_id(&3).unwrap();
    manager.remove_element_by_id(&3).unwrap();
    assert!(!manager.current_tree_contains_id(&3));

    manager.update_element(&stale).unwrap();
    assert!(manager.contains_id(&1, &3));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_caller_mutation_when_inspecting_copy_then_dirty_until_updated(
    mut manager: TreeManager<u32>,
) {
    let mut copy = manager.get_element_by_id(&3).unwrap();
    assert!(copy.is_attached());

    let handle = copy.root();
    copy.set_payload(handle, Box::new(Task::new(3, Some(1))));
    assert!(copy.is_dirty());
    assert!(!copy.is_attached());

    let synced = manager.update_element(&copy).unwrap();
    assert!(!synced.is_dirty());
    assert!(synced.is_attached());
}

#[rstest]
fn given_updated_payload_when_reading_back_then_tree_reflects_it(
    mut manager: TreeManager<u32>,
) {
    let mut copy = manager.get_element_by_id(&2).unwrap();
    let handle = copy.root();
    let replacement = Task {
        id: 2,
        parent: Some(1),
        title: "renamed".to_string(),
    };
    copy.set_payload(handle, Box::new(replacement.clone()));
    manager.update_element(&copy).unwrap();

    let read_back = manager.get_element_by_id(&2).unwrap();
    let payload = read_back.payload().unwrap();
    assert!(payload.eq_record(&replacement));
    // child subtree survived the update
    assert!(manager.contains_id(&2, &4));
}

#[rstest]
fn given_reparented_copy_when_updating_then_subtree_moves(mut manager: TreeManager<u32>) {
    let mut copy = manager.get_element_by_id(&4).unwrap();
    let handle = copy.root();
    copy.set_parent_id(handle, Some(3));
    manager.update_element(&copy).unwrap();

    assert!(manager.contains_id(&3, &4));
    assert!(!manager.contains_id(&2, &4));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_parent_inside_own_subtree_when_updating_then_invalid_input(
    mut manager: TreeManager<u32>,
) {
    let mut copy = manager.get_element_by_id(&2).unwrap();
    let handle = copy.root();
    copy.set_parent_id(handle, Some(4));
    let err = manager.update_element(&copy).unwrap_err();
    assert!(matches!(err, TreeError::InvalidInput(_)));
    // nothing moved
    assert!(manager.contains_id(&2, &4));
}

#[rstest]
fn given_caller_grown_subtree_when_updating_then_new_children_attach(
    mut manager: TreeManager<u32>,
) {
    let mut copy = manager.get_element_by_id(&3).unwrap();
    let handle = copy.root();
    let child = manager.create_element(6, Some(3), Task::new(6, Some(3)));
    copy.add_child(handle, child).unwrap();

    manager.update_element(&copy).unwrap();
    assert!(manager.contains_id(&3, &6));
    assert_eq!(common::element_count(&manager, "a"), 5);
    let e = manager.get_element_by_id(&6).unwrap();
    assert_eq!(e.state(), LifecycleState::Attached);
}
