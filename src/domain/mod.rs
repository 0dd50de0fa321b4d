//! Domain layer: elements, sessions, lifecycle and the recursive tree
//! algorithms.
//!
//! This layer is independent of external concerns (no I/O, no CLI).

pub mod algorithms;
pub mod element;
pub mod error;
pub mod lifecycle;
pub mod record;
pub mod session;

pub use element::{Element, Node, NodeId};
pub use error::{TreeError, TreeResult};
pub use lifecycle::{LifecycleState, Operation};
pub use record::{BoxedRecord, ErasedRecord, Key, Record};
pub use session::{Session, SessionId, Transaction};
