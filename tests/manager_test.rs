mod common;

use arbor::util::testing;
use arbor::{Operation, TreeError, TreeManager};
use common::{Note, Task};
use rstest::{fixture, rstest};

#[ctor::ctor]
fn init() {
    testing::init_test_setup();
}

#[fixture]
fn manager() -> TreeManager<u32> {
    common::manager_with_session("a")
}

/// Fixture with a second session "b" holding {10 -> {11}}; "a" is current.
#[fixture]
fn two_sessions() -> TreeManager<u32> {
    let mut manager = common::manager_with_session("a");
    manager
        .initialize_session_with::<Task>("b", vec![Task::new(10, None), Task::new(11, Some(10))])
        .unwrap();
    manager.session_checkout("a").unwrap();
    manager
}

#[rstest]
fn given_no_session_when_mutating_then_no_current_session(mut manager: TreeManager<u32>) {
    manager.destroy_all_sessions();
    let fresh = manager.create_element(5, None, Task::new(5, None));
    assert!(matches!(
        manager.persist_element(&fresh),
        Err(TreeError::NoCurrentSession)
    ));
    assert!(matches!(
        manager.remove_element_by_id(&1),
        Err(TreeError::NoCurrentSession)
    ));
    assert!(manager.get_element_by_id(&1).is_none());
    assert!(manager.root().is_none());
}

#[rstest]
fn given_unknown_parent_when_persisting_then_element_lands_under_root(
    mut manager: TreeManager<u32>,
) {
    let fresh = manager.create_element(9, Some(42), Task::new(9, Some(42)));
    let persisted = manager.persist_element(&fresh).unwrap();
    assert!(manager.current_tree_contains_id(&9));
    assert!(!manager.contains_id(&1, &9));
    // stored parent reference reflects the actual insertion point
    assert_eq!(persisted.parent_id(), None);
}

#[rstest]
fn given_taken_id_when_persisting_then_duplicate_id(mut manager: TreeManager<u32>) {
    let fresh = manager.create_element(3, None, Task::new(3, None));
    let err = manager.persist_element(&fresh).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateId(3)));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_wrong_payload_type_when_persisting_then_mismatch(mut manager: TreeManager<u32>) {
    let fresh = manager.create_element(9, None, Note { id: 9, parent: None });
    let err = manager.persist_element(&fresh).unwrap_err();
    assert!(matches!(err, TreeError::MismatchedPayloadType { .. }));
}

#[rstest]
fn given_element_subtree_when_removing_then_whole_subtree_detaches(
    mut manager: TreeManager<u32>,
) {
    let removed = manager.remove_element_by_id(&2).unwrap();
    assert_eq!(removed.node_count(), 2);
    assert_eq!(common::element_count(&manager, "a"), 2);
    assert!(manager.get_element_by_id(&4).is_none());

    assert!(matches!(
        manager.remove_element_by_id(&2),
        Err(TreeError::ElementNotFound(2))
    ));
}

#[rstest]
fn given_root_when_removing_or_cutting_then_root_operation(mut manager: TreeManager<u32>) {
    let root = manager.root().unwrap();
    assert!(matches!(
        manager.remove_element(&root),
        Err(TreeError::RootOperation {
            operation: Operation::Remove
        })
    ));
    assert!(matches!(
        manager.cut(&root, None),
        Err(TreeError::RootOperation {
            operation: Operation::Cut
        })
    ));
    assert!(matches!(
        manager.copy(&root, None),
        Err(TreeError::RootOperation {
            operation: Operation::Copy
        })
    ));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_same_session_cut_when_targeting_sibling_then_subtree_moves(
    mut manager: TreeManager<u32>,
) {
    let moved = manager.cut_by_id(&4, Some(&3)).unwrap();
    assert_eq!(moved.parent_id(), Some(&3));
    assert!(manager.contains_id(&3, &4));
    assert!(!manager.contains_id(&2, &4));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_same_session_cut_when_targeting_null_then_subtree_moves_to_root(
    mut manager: TreeManager<u32>,
) {
    let moved = manager.cut_by_id(&2, None).unwrap();
    assert_eq!(moved.parent_id(), None);
    assert_eq!(moved.node_count(), 2);
    assert!(!manager.contains_id(&1, &2));
    assert!(manager.current_tree_contains_id(&2));
    assert!(manager.contains_id(&2, &4));
}

#[rstest]
fn given_cut_into_own_descendant_then_duplicate_id(mut manager: TreeManager<u32>) {
    // the destination subtree {4} is part of the moving subtree {2, 4}
    let err = manager.cut_by_id(&2, Some(&4)).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateId(4)));
    assert!(manager.contains_id(&1, &2));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_copy_into_own_descendant_then_duplicate_id(mut manager: TreeManager<u32>) {
    // ids are preserved on copy, so the destination subtree collides
    let err = manager.copy_by_id(&2, Some(&4)).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateId(4)));
    assert_eq!(common::element_count(&manager, "a"), 4);
}

#[rstest]
fn given_unknown_endpoints_when_cutting_then_lookup_errors(mut manager: TreeManager<u32>) {
    assert!(matches!(
        manager.cut_by_id(&99, None),
        Err(TreeError::ElementNotFound(99))
    ));
    assert!(matches!(
        manager.cut_by_id(&4, Some(&99)),
        Err(TreeError::ElementNotFound(99))
    ));
}

#[rstest]
fn given_two_sessions_when_cutting_across_then_counts_and_ownership_move(
    mut two_sessions: TreeManager<u32>,
) {
    let dest = {
        two_sessions.session_checkout("b").unwrap();
        let dest = two_sessions.get_element_by_id(&11).unwrap();
        two_sessions.session_checkout("a").unwrap();
        dest
    };
    let src = two_sessions.get_element_by_id(&2).unwrap();

    let moved = two_sessions.cut(&src, Some(&dest)).unwrap();
    assert_eq!(moved.attached_to(), Some(&"b".to_string()));
    assert_eq!(moved.parent_id(), Some(&11));

    assert_eq!(common::element_count(&two_sessions, "a"), 2);
    assert_eq!(common::element_count(&two_sessions, "b"), 4);
    assert!(!two_sessions.current_tree_contains_id(&2));

    // the current-session pointer survives the excursion to "b"
    assert_eq!(two_sessions.current_session().unwrap().id(), "a");
}

#[rstest]
fn given_duplicate_in_destination_when_cutting_across_then_both_sessions_intact(
    mut two_sessions: TreeManager<u32>,
) {
    // plant a colliding id inside the destination subtree of 10
    two_sessions.session_checkout("b").unwrap();
    let fresh = two_sessions.create_element(4, Some(11), Task::new(4, Some(11)));
    two_sessions.persist_element(&fresh).unwrap();
    two_sessions.session_checkout("a").unwrap();

    let src = two_sessions.get_element_by_id(&2).unwrap();
    two_sessions.session_checkout("b").unwrap();
    let dest = two_sessions.get_element_by_id(&10).unwrap();
    two_sessions.session_checkout("a").unwrap();

    let err = two_sessions.cut(&src, Some(&dest)).unwrap_err();
    assert!(matches!(err, TreeError::DuplicateId(4)));
    assert_eq!(common::element_count(&two_sessions, "a"), 4);
    assert_eq!(common::element_count(&two_sessions, "b"), 3);
    assert_eq!(two_sessions.current_session().unwrap().id(), "a");
}

#[rstest]
fn given_two_sessions_when_copying_across_then_source_is_untouched(
    mut two_sessions: TreeManager<u32>,
) {
    let src = two_sessions.get_element_by_id(&2).unwrap();
    two_sessions.session_checkout("b").unwrap();
    let dest = two_sessions.get_element_by_id(&10).unwrap();
    two_sessions.session_checkout("a").unwrap();

    let copied = two_sessions.copy(&src, Some(&dest)).unwrap();
    assert_eq!(copied.attached_to(), Some(&"b".to_string()));
    assert_eq!(copied.node_count(), 2);

    assert_eq!(common::element_count(&two_sessions, "a"), 4);
    assert_eq!(common::element_count(&two_sessions, "b"), 4);
    assert!(two_sessions.contains_id(&2, &4));
    assert_eq!(two_sessions.current_session().unwrap().id(), "a");

    two_sessions.session_checkout("b").unwrap();
    assert!(two_sessions.contains_id(&10, &2));
    assert!(two_sessions.contains_id(&2, &4));
}

#[rstest]
fn given_dirty_copy_when_cutting_then_stored_state_wins(mut manager: TreeManager<u32>) {
    // caller scratch mutations on the copy never reach the tree; the cut
    // operates on the stored, attached element
    let mut src = manager.get_element_by_id(&4).unwrap();
    let handle = src.root();
    src.set_payload(handle, Box::new(Task::new(4, Some(2))));
    assert!(src.is_dirty());

    let moved = manager.cut(&src, None).unwrap();
    assert!(!moved.is_dirty());
    assert!(!manager.contains_id(&2, &4));
    assert!(manager.current_tree_contains_id(&4));
}

#[rstest]
fn given_contains_queries_then_they_follow_the_structure(manager: TreeManager<u32>) {
    let a = manager.get_element_by_id(&1).unwrap();
    let b = manager.get_element_by_id(&4).unwrap();
    assert!(manager.contains_element(&a, &b));
    assert!(!manager.contains_element(&b, &a));
    assert!(manager.current_tree_contains_element(&b));

    let stranger = manager.create_element(99, None, Task::new(99, None));
    assert!(!manager.current_tree_contains_element(&stranger));
}
