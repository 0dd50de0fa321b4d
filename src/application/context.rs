//! Shared context structs for the validation chains and the transformation
//! pipeline.

use std::any::TypeId;
use std::collections::HashMap;

use crate::domain::element::{Element, NodeId};
use crate::domain::lifecycle::Operation;
use crate::domain::record::{BoxedRecord, Key, Record};
use crate::domain::session::{Session, SessionId};

/// Destination side of an operation: the tree the subtree is headed for and
/// the node whose id set the duplicate check runs against.
pub struct TargetRef<'a, K: Key> {
    pub tree: &'a Element<K>,
    pub node: NodeId,
}

/// Read-only context a validation chain runs against. Validators never
/// mutate state; the manager assembles one context per operation and runs
/// the chain to completion before touching any tree.
pub struct OperationContext<'a, K: Key> {
    pub operation: Operation,
    /// Tree holding the element the operation applies to.
    pub source: &'a Element<K>,
    pub source_node: NodeId,
    pub target: Option<TargetRef<'a, K>>,
    /// Subtree in the target tree whose ids are about to be replaced and are
    /// therefore exempt from the duplicate check (update only).
    pub exclude_subtree: Option<NodeId>,
    /// Declared record type of the receiving session, when the operation
    /// inserts payloads.
    pub session_type: Option<(TypeId, &'static str)>,
    /// Same-session cut to the tree root skips the duplicate check.
    pub skip_duplicate_check: bool,
}

/// Ephemeral state threaded through the five pipeline stages and discarded
/// after the run, success or failure.
pub struct PipelineContext<K: Key> {
    pub(crate) session_id: SessionId,
    pub(crate) records: Vec<BoxedRecord<K>>,
    pub(crate) payload_type: TypeId,
    pub(crate) type_name: &'static str,
    /// Extracted identifiers, parallel to `records`.
    pub(crate) ids: Vec<K>,
    /// id -> extracted parent id.
    pub(crate) parents: HashMap<K, Option<K>>,
    /// id -> position in `records`.
    pub(crate) positions: HashMap<K, usize>,
    /// Session under assembly; registered only after the whole run succeeds.
    pub(crate) session: Option<Session<K>>,
    /// id -> created node handle within the session tree.
    pub(crate) nodes: HashMap<K, NodeId>,
    /// Nodes without a parent in the created set; reparented onto the
    /// synthetic root at commit.
    pub(crate) first_level: Vec<NodeId>,
}

impl<K: Key> PipelineContext<K> {
    pub fn new<R: Record<Key = K>>(session_id: SessionId, records: Vec<R>) -> Self {
        let records: Vec<BoxedRecord<K>> = records
            .into_iter()
            .map(|r| Box::new(r) as BoxedRecord<K>)
            .collect();
        Self {
            session_id,
            records,
            payload_type: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            ids: Vec::new(),
            parents: HashMap::new(),
            positions: HashMap::new(),
            session: None,
            nodes: HashMap::new(),
            first_level: Vec::new(),
        }
    }
}
