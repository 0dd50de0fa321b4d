#![allow(dead_code)]

use arbor::{Record, TreeManager};

/// Flat record type used across the integration tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u32,
    pub parent: Option<u32>,
    pub title: String,
}

impl Task {
    pub fn new(id: u32, parent: Option<u32>) -> Self {
        Self {
            id,
            parent,
            title: format!("task-{}", id),
        }
    }
}

impl Record for Task {
    type Key = u32;

    fn identifier(&self) -> Option<u32> {
        Some(self.id)
    }

    fn parent_identifier(&self) -> Option<u32> {
        self.parent
    }
}

/// A second record type, for payload-type-mismatch scenarios.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: u32,
    pub parent: Option<u32>,
}

impl Record for Note {
    type Key = u32;

    fn identifier(&self) -> Option<u32> {
        Some(self.id)
    }

    fn parent_identifier(&self) -> Option<u32> {
        self.parent
    }
}

/// 1 -> {2 -> {4}, 3}
pub fn flat_records() -> Vec<Task> {
    vec![
        Task::new(1, None),
        Task::new(2, Some(1)),
        Task::new(3, Some(1)),
        Task::new(4, Some(2)),
    ]
}

pub fn manager_with_session(session_id: &str) -> TreeManager<u32> {
    let mut manager = TreeManager::new();
    manager
        .initialize_session_with::<Task>(session_id, flat_records())
        .unwrap();
    manager
}

pub fn element_count(manager: &TreeManager<u32>, session_id: &str) -> usize {
    manager
        .transaction()
        .session(session_id)
        .map(|s| s.element_count())
        .unwrap_or(0)
}
