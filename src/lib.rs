//! arbor: an in-process store for hierarchical data.
//!
//! Flat collections of records that reference their parents by id become
//! navigable session trees; all mutation goes through a validated manager
//! façade and callers only ever hold defensive copies.
//!
//! ```
//! use arbor::{Record, TreeManager};
//!
//! #[derive(Clone, PartialEq, Debug)]
//! struct Dept {
//!     id: u32,
//!     parent: Option<u32>,
//! }
//!
//! impl Record for Dept {
//!     type Key = u32;
//!
//!     fn identifier(&self) -> Option<u32> {
//!         Some(self.id)
//!     }
//!
//!     fn parent_identifier(&self) -> Option<u32> {
//!         self.parent
//!     }
//! }
//!
//! let mut manager = TreeManager::new();
//! let records = vec![
//!     Dept { id: 1, parent: None },
//!     Dept { id: 2, parent: Some(1) },
//! ];
//! manager.initialize_session_with::<Dept>("org", records).unwrap();
//! assert!(manager.current_tree_contains_id(&2));
//! ```

pub mod application;
pub mod domain;
pub mod util;

pub use application::TreeManager;
pub use domain::{
    BoxedRecord, Element, ErasedRecord, Key, LifecycleState, Operation, Record, Session,
    SessionId, Transaction, TreeError, TreeResult,
};
