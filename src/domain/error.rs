//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::lifecycle::{LifecycleState, Operation};
use crate::domain::record::Key;
use crate::domain::session::SessionId;

/// Domain errors represent tree-consistency violations and caller
/// programming errors (null/empty mandatory arguments).
///
/// Everything except `InvalidInput` and `Inconsistent` is expected to occur
/// in normal use and be handled by the caller. `Inconsistent` signals an
/// assembly bug, not a caller error.
#[derive(Error, Debug)]
pub enum TreeError<K: Key> {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session already exists: {0}")]
    DuplicateSessionId(SessionId),

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("no current session")]
    NoCurrentSession,

    #[error("element not found: {0:?}")]
    ElementNotFound(K),

    #[error("duplicate element id: {0:?}")]
    DuplicateId(K),

    #[error("payload type {actual} does not match session type {expected}")]
    MismatchedPayloadType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("operation {operation} is not allowed on the root element")]
    RootOperation { operation: Operation },

    #[error("operation {operation} is not permitted in state {state}")]
    InvalidLifecycleState {
        operation: Operation,
        state: LifecycleState,
    },

    #[error("element {0:?} is not attached (modified outside a sanctioned operation)")]
    NotAttached(K),

    #[error("element {id:?} is already attached to session {session}")]
    AlreadyAttached { id: K, session: SessionId },

    #[error("tree assembly inconsistency: {0}")]
    Inconsistent(String),
}

/// Result type for tree operations.
pub type TreeResult<T, K> = Result<T, TreeError<K>>;
