//! Element lifecycle: the explicit state machine half of the dual tracking
//! mechanism (the dirty flag lives on the node itself).

use std::fmt;

/// Mutating operations gated by the validation chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Cut,
    Copy,
    Remove,
    Persist,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Cut => "cut",
            Operation::Copy => "copy",
            Operation::Remove => "remove",
            Operation::Persist => "persist",
            Operation::Update => "update",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle states: `NotExisted -> Attached -> Detached`, with
/// `Detached -> Attached` again via update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Created but never persisted into a session.
    #[default]
    NotExisted,
    /// Live member of a session tree.
    Attached,
    /// Removed from its session; only update may bring it back.
    Detached,
}

impl LifecycleState {
    /// Which operations this state allows on an element.
    pub fn permits(self, operation: Operation) -> bool {
        match self {
            LifecycleState::NotExisted => matches!(operation, Operation::Persist),
            LifecycleState::Attached => matches!(
                operation,
                Operation::Cut | Operation::Copy | Operation::Remove | Operation::Update
            ),
            LifecycleState::Detached => matches!(operation, Operation::Update),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::NotExisted => "not-existed",
            LifecycleState::Attached => "attached",
            LifecycleState::Detached => "detached",
        };
        write!(f, "{}", name)
    }
}
