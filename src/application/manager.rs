//! Tree manager façade.
//!
//! Every mutating call builds an [`OperationContext`], runs the matching
//! validation chain to completion, performs the structural change on the
//! session trees, transitions lifecycle state, and hands back a defensive
//! copy so callers cannot bypass validation by mutating live nodes.
//!
//! Single-threaded cooperative model: one manager per logical caller, no
//! internal locking. The one logical-atomicity point is cross-session
//! cut/copy: destination checkout, validation, transfer and checkout-back
//! form a unit. Validation runs before any structural change, so a
//! destination rejection leaves both trees untouched; the current-session
//! pointer is restored on success and on failure.

use tracing::{debug, instrument};

use crate::application::context::{OperationContext, PipelineContext, TargetRef};
use crate::application::pipeline::TransformationPipeline;
use crate::application::validation::ValidationChain;
use crate::domain::algorithms;
use crate::domain::element::{Element, NodeId};
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::record::{Key, Record};
use crate::domain::session::{Session, SessionId, Transaction};
use crate::domain::Operation;

/// Façade over the transaction registry, the transformation pipeline and the
/// validation chains.
pub struct TreeManager<K: Key> {
    transaction: Transaction<K>,
    pipeline: TransformationPipeline<K>,
}

impl<K: Key> Default for TreeManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> TreeManager<K> {
    pub fn new() -> Self {
        Self::with_transaction(Transaction::new())
    }

    /// Construct with an explicit registry (dependency injection for tests
    /// and embedders).
    pub fn with_transaction(transaction: Transaction<K>) -> Self {
        Self {
            transaction,
            pipeline: TransformationPipeline::new(),
        }
    }

    pub fn transaction(&self) -> &Transaction<K> {
        &self.transaction
    }

    // ------------------------------------------------------------
    // Transaction API
    // ------------------------------------------------------------

    /// Manual-build mode: open an empty tree typed by `R`; the new session
    /// becomes current.
    pub fn initialize_session<R: Record<Key = K>>(&mut self, id: &str) -> TreeResult<(), K> {
        self.transaction.initialize_session::<R>(id).map(|_| ())
    }

    /// Flat-collection mode: run the transformation pipeline and register
    /// the resulting session. All-or-nothing: any stage failure leaves the
    /// registry untouched.
    #[instrument(level = "debug", skip(self, records))]
    pub fn initialize_session_with<R: Record<Key = K>>(
        &mut self,
        id: &str,
        records: Vec<R>,
    ) -> TreeResult<(), K> {
        self.transaction.reserve_session_id(id)?;
        if records.is_empty() {
            return Err(TreeError::InvalidInput(
                "empty record collection".to_string(),
            ));
        }
        let ctx = PipelineContext::new::<R>(id.to_string(), records);
        let session = self.pipeline.run(ctx)?;
        self.transaction.commit_session(session);
        Ok(())
    }

    pub fn session_checkout(&mut self, id: &str) -> Option<&Session<K>> {
        self.transaction.session_checkout(id)
    }

    pub fn destroy_session(&mut self, id: &str) -> TreeResult<(), K> {
        self.transaction.destroy_session(id)
    }

    pub fn destroy_current_session(&mut self) -> TreeResult<(), K> {
        self.transaction.destroy_current_session()
    }

    pub fn destroy_all_sessions(&mut self) {
        self.transaction.destroy_all_sessions()
    }

    pub fn activate_session(&mut self, id: &str) -> TreeResult<(), K> {
        self.transaction.activate_session(id)
    }

    pub fn deactivate_session(&mut self, id: &str) -> TreeResult<(), K> {
        self.transaction.deactivate_session(id)
    }

    pub fn activate_current_session(&mut self) -> TreeResult<(), K> {
        self.transaction.activate_current_session()
    }

    pub fn deactivate_current_session(&mut self) -> TreeResult<(), K> {
        self.transaction.deactivate_current_session()
    }

    pub fn sessions(&self) -> Vec<&Session<K>> {
        self.transaction.sessions()
    }

    pub fn clone_session(
        &mut self,
        source_id: &str,
        new_id: &str,
    ) -> TreeResult<Option<&Session<K>>, K> {
        self.transaction.clone_session(source_id, new_id)
    }

    pub fn current_session(&self) -> Option<&Session<K>> {
        self.transaction.current_session()
    }

    // ------------------------------------------------------------
    // Query API
    // ------------------------------------------------------------

    /// A fresh element wrapping `payload`, in state `NotExisted`.
    pub fn create_element<R: Record<Key = K>>(
        &self,
        id: K,
        parent_id: Option<K>,
        payload: R,
    ) -> Element<K> {
        Element::new(id, parent_id, Some(Box::new(payload)))
    }

    /// Defensive copy of the element with `id` in the current session.
    pub fn get_element_by_id(&self, id: &K) -> Option<Element<K>> {
        let session = self.transaction.current_session()?;
        let node = session.lookup(id)?;
        session.tree().copy_subtree(node)
    }

    /// Defensive copy of the current session's whole tree, rooted at the
    /// synthetic root.
    pub fn root(&self) -> Option<Element<K>> {
        self.transaction
            .current_session()
            .map(|s| s.tree().deep_copy())
    }

    /// True when element `b` lies within the subtree of element `a` in the
    /// current session.
    pub fn contains_id(&self, a: &K, b: &K) -> bool {
        let Some(session) = self.transaction.current_session() else {
            return false;
        };
        let Some(a_node) = session.lookup(a) else {
            return false;
        };
        algorithms::find_by_id(session.tree(), a_node, b).is_some()
    }

    pub fn contains_element(&self, a: &Element<K>, b: &Element<K>) -> bool {
        match (a.id(), b.id()) {
            (Some(a), Some(b)) => self.contains_id(a, b),
            _ => false,
        }
    }

    /// True when the element exists anywhere in the current session's tree.
    pub fn current_tree_contains_element(&self, element: &Element<K>) -> bool {
        element
            .id()
            .map(|id| self.current_tree_contains_id(id))
            .unwrap_or(false)
    }

    pub fn current_tree_contains_id(&self, id: &K) -> bool {
        self.transaction
            .current_session()
            .map(|s| s.contains_id(id))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------
    // Mutation API
    // ------------------------------------------------------------

    /// Attach a fresh (`NotExisted`) element subtree to the current session,
    /// under the node named by its parent id, or under the root when the
    /// parent is absent.
    #[instrument(level = "debug", skip(self, element), fields(id = ?element.id()))]
    pub fn persist_element(&mut self, element: &Element<K>) -> TreeResult<Element<K>, K> {
        let session = self
            .transaction
            .current_session()
            .ok_or(TreeError::NoCurrentSession)?;
        let ctx = OperationContext {
            operation: Operation::Persist,
            source: element,
            source_node: element.root(),
            target: Some(TargetRef {
                tree: session.tree(),
                node: session.tree().root(),
            }),
            exclude_subtree: None,
            session_type: Some((session.payload_type(), session.type_name())),
            skip_duplicate_check: false,
        };
        ValidationChain::for_operation(Operation::Persist).run(&ctx)?;

        let parent = element
            .parent_id()
            .and_then(|p| session.lookup(p))
            .unwrap_or_else(|| session.tree().root());
        self.graft_attached(element.deep_copy(), parent)
    }

    /// Re-synchronize the tree from a caller-modified copy: the subtree with
    /// the element's id is replaced (or re-attached, for detached elements),
    /// and the result is re-attached clean.
    #[instrument(level = "debug", skip(self, element), fields(id = ?element.id()))]
    pub fn update_element(&mut self, element: &Element<K>) -> TreeResult<Element<K>, K> {
        let session = self
            .transaction
            .current_session()
            .ok_or(TreeError::NoCurrentSession)?;
        let id = match element.id() {
            Some(id) => id.clone(),
            None => {
                return Err(TreeError::RootOperation {
                    operation: Operation::Update,
                })
            }
        };
        let existing = session.lookup(&id);
        let ctx = OperationContext {
            operation: Operation::Update,
            source: element,
            source_node: element.root(),
            target: Some(TargetRef {
                tree: session.tree(),
                node: session.tree().root(),
            }),
            exclude_subtree: existing,
            session_type: Some((session.payload_type(), session.type_name())),
            skip_duplicate_check: false,
        };
        ValidationChain::for_operation(Operation::Update).run(&ctx)?;

        let parent = element.parent_id().and_then(|p| session.lookup(p));
        if let (Some(old), Some(p)) = (existing, parent) {
            if algorithms::flatten(session.tree(), old).contains(&p) {
                return Err(TreeError::InvalidInput(
                    "new parent lies inside the updated subtree".to_string(),
                ));
            }
        }

        if let Some(old) = existing {
            let session = self
                .transaction
                .current_session_mut()
                .ok_or(TreeError::NoCurrentSession)?;
            let old_ids = algorithms::subtree_ids(session.tree(), old);
            session
                .tree_mut()
                .extract(old)
                .ok_or_else(|| TreeError::Inconsistent("indexed node vanished".to_string()))?;
            session.index_remove_ids(&old_ids);
        }
        let root = self
            .transaction
            .current_session()
            .ok_or(TreeError::NoCurrentSession)?
            .tree()
            .root();
        self.graft_attached(element.deep_copy(), parent.unwrap_or(root))
    }

    /// Detach a subtree from the current session; the returned element is
    /// `Detached` and only update may bring it back.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_element_by_id(&mut self, id: &K) -> TreeResult<Element<K>, K> {
        let session = self
            .transaction
            .current_session()
            .ok_or(TreeError::NoCurrentSession)?;
        let node = session
            .lookup(id)
            .ok_or_else(|| TreeError::ElementNotFound(id.clone()))?;
        let ctx = OperationContext {
            operation: Operation::Remove,
            source: session.tree(),
            source_node: node,
            target: None,
            exclude_subtree: None,
            session_type: None,
            skip_duplicate_check: false,
        };
        ValidationChain::for_operation(Operation::Remove).run(&ctx)?;

        let removed_ids = algorithms::subtree_ids(session.tree(), node);
        let session = self
            .transaction
            .current_session_mut()
            .ok_or(TreeError::NoCurrentSession)?;
        let mut removed = session
            .tree_mut()
            .extract(node)
            .ok_or_else(|| TreeError::Inconsistent("indexed node vanished".to_string()))?;
        session.index_remove_ids(&removed_ids);
        let removed_root = removed.root();
        removed.mark_detached(removed_root);
        debug!(count = removed_ids.len(), "removed subtree");
        Ok(removed)
    }

    pub fn remove_element(&mut self, element: &Element<K>) -> TreeResult<Element<K>, K> {
        match element.id() {
            Some(id) => self.remove_element_by_id(&id.clone()),
            None => Err(TreeError::RootOperation {
                operation: Operation::Remove,
            }),
        }
    }

    /// Move a subtree. `to` names the destination element; `None` moves to
    /// the source tree's root. Elements attached to other sessions make the
    /// operation cross-session.
    pub fn cut(
        &mut self,
        from: &Element<K>,
        to: Option<&Element<K>>,
    ) -> TreeResult<Element<K>, K> {
        let (from_id, from_session, to_id, to_session) =
            self.resolve_endpoints(Operation::Cut, from, to)?;
        self.transfer(Operation::Cut, from_session, from_id, to_session, to_id)
    }

    /// Id-based overload of [`cut`](Self::cut); both ids resolve in the
    /// current session.
    pub fn cut_by_id(&mut self, from: &K, to: Option<&K>) -> TreeResult<Element<K>, K> {
        let session = self.current_session_id()?;
        self.transfer(
            Operation::Cut,
            session.clone(),
            from.clone(),
            session,
            to.cloned(),
        )
    }

    /// Copy a subtree; ids are preserved, so the destination must be free of
    /// every id in the source.
    pub fn copy(
        &mut self,
        from: &Element<K>,
        to: Option<&Element<K>>,
    ) -> TreeResult<Element<K>, K> {
        let (from_id, from_session, to_id, to_session) =
            self.resolve_endpoints(Operation::Copy, from, to)?;
        self.transfer(Operation::Copy, from_session, from_id, to_session, to_id)
    }

    pub fn copy_by_id(&mut self, from: &K, to: Option<&K>) -> TreeResult<Element<K>, K> {
        let session = self.current_session_id()?;
        self.transfer(
            Operation::Copy,
            session.clone(),
            from.clone(),
            session,
            to.cloned(),
        )
    }

    // ------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------

    fn current_session_id(&self) -> TreeResult<SessionId, K> {
        self.transaction
            .current_session_id()
            .map(String::from)
            .ok_or(TreeError::NoCurrentSession)
    }

    /// Resolve element-based endpoints to (id, session) pairs. Unattached
    /// endpoints fall back to the current session.
    fn resolve_endpoints(
        &self,
        operation: Operation,
        from: &Element<K>,
        to: Option<&Element<K>>,
    ) -> TreeResult<(K, SessionId, Option<K>, SessionId), K> {
        // Only the synthetic session root carries no id.
        let from_id = match from.id() {
            Some(id) => id.clone(),
            None => return Err(TreeError::RootOperation { operation }),
        };
        let from_session = match from.attached_to() {
            Some(s) => s.clone(),
            None => self.current_session_id()?,
        };
        let (to_id, to_session) = match to {
            Some(el) => {
                let session = match el.attached_to() {
                    Some(s) => s.clone(),
                    None => self.current_session_id()?,
                };
                (el.id().cloned(), session)
            }
            // Null destination: the source tree's own root.
            None => (None, from_session.clone()),
        };
        Ok((from_id, from_session, to_id, to_session))
    }

    /// Shared cut/copy implementation. Validation runs to completion before
    /// any mutation; the current-session pointer is checked out to the
    /// destination for the duration of the destination-side work and
    /// restored afterwards (checkout-back), or rolled back together with the
    /// source side if anything fails at the destination.
    #[instrument(level = "debug", skip(self), fields(op = %operation))]
    fn transfer(
        &mut self,
        operation: Operation,
        source_session_id: SessionId,
        source_id: K,
        dest_session_id: SessionId,
        dest_id: Option<K>,
    ) -> TreeResult<Element<K>, K> {
        let same_session = source_session_id == dest_session_id;
        let to_root = dest_id.is_none();
        let skip_duplicate_check = operation == Operation::Cut && same_session && to_root;

        // Resolve both endpoints before touching anything.
        let source_session = self
            .transaction
            .session(&source_session_id)
            .ok_or_else(|| TreeError::UnknownSession(source_session_id.clone()))?;
        let source_node = source_session
            .lookup(&source_id)
            .ok_or_else(|| TreeError::ElementNotFound(source_id.clone()))?;

        let dest_session = self
            .transaction
            .session(&dest_session_id)
            .ok_or_else(|| TreeError::UnknownSession(dest_session_id.clone()))?;
        let dest_node = match &dest_id {
            Some(id) => dest_session
                .lookup(id)
                .ok_or_else(|| TreeError::ElementNotFound(id.clone()))?,
            None => dest_session.tree().root(),
        };

        // Checkout the destination for the validation + transfer unit.
        let previous_current = self.transaction.current_session_id().map(String::from);
        self.transaction.set_current(Some(dest_session_id.clone()));

        let result = self.validate_and_transfer(
            operation,
            &source_session_id,
            source_node,
            &source_id,
            &dest_session_id,
            dest_node,
            skip_duplicate_check,
        );

        // Checkout-back, success or failure.
        self.transaction.set_current(previous_current);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_and_transfer(
        &mut self,
        operation: Operation,
        source_session_id: &SessionId,
        source_node: NodeId,
        source_id: &K,
        dest_session_id: &SessionId,
        dest_node: NodeId,
        skip_duplicate_check: bool,
    ) -> TreeResult<Element<K>, K> {
        let same_session = source_session_id == dest_session_id;
        {
            let source_session = self
                .transaction
                .session(source_session_id)
                .ok_or_else(|| TreeError::UnknownSession(source_session_id.clone()))?;
            let dest_session = self
                .transaction
                .session(dest_session_id)
                .ok_or_else(|| TreeError::UnknownSession(dest_session_id.clone()))?;

            // Duplicate scope is the destination subtree. This also rejects
            // moving a subtree under one of its own nodes before any
            // mutation: such a destination's ids are a subset of the moved
            // subtree's ids and collide.
            let ctx = OperationContext {
                operation,
                source: source_session.tree(),
                source_node,
                target: Some(TargetRef {
                    tree: dest_session.tree(),
                    node: dest_node,
                }),
                exclude_subtree: None,
                session_type: None,
                skip_duplicate_check,
            };
            ValidationChain::for_operation(operation).run(&ctx)?;
        }

        // Structural transfer. Within one session both handles live in the
        // same arena; across sessions the subtree changes arenas.
        if same_session {
            let session = self
                .transaction
                .session_mut(source_session_id)
                .ok_or_else(|| TreeError::UnknownSession(source_session_id.clone()))?;
            let subtree = match operation {
                Operation::Cut => session
                    .tree_mut()
                    .extract(source_node)
                    .ok_or_else(|| TreeError::Inconsistent("indexed node vanished".to_string()))?,
                _ => session
                    .tree()
                    .copy_subtree(source_node)
                    .ok_or_else(|| TreeError::Inconsistent("indexed node vanished".to_string()))?,
            };
            let session_id = session.id().to_string();
            let grafted = session
                .tree_mut()
                .graft(dest_node, subtree)
                .ok_or_else(|| TreeError::Inconsistent("destination vanished".to_string()))?;
            // The moved root now lives under a new parent; its stored parent
            // reference follows the structure. mark_attached resnapshots.
            let new_parent_id = session
                .tree()
                .node(dest_node)
                .and_then(|n| n.id().cloned());
            session.tree_mut().set_parent_id(grafted, new_parent_id);
            session.tree_mut().mark_attached(grafted, &session_id);
            session.index_insert_subtree(grafted);
            let copy = session
                .tree()
                .copy_subtree(grafted)
                .ok_or_else(|| TreeError::Inconsistent("grafted node vanished".to_string()))?;
            debug!(id = ?source_id, "transferred within session");
            return Ok(copy);
        }

        // Cross-session: take the subtree out of the source arena first.
        let subtree = {
            let session = self
                .transaction
                .session_mut(source_session_id)
                .ok_or_else(|| TreeError::UnknownSession(source_session_id.clone()))?;
            match operation {
                Operation::Cut => {
                    let removed_ids = algorithms::subtree_ids(session.tree(), source_node);
                    let subtree = session.tree_mut().extract(source_node).ok_or_else(|| {
                        TreeError::Inconsistent("indexed node vanished".to_string())
                    })?;
                    session.index_remove_ids(&removed_ids);
                    subtree
                }
                _ => session.tree().copy_subtree(source_node).ok_or_else(|| {
                    TreeError::Inconsistent("indexed node vanished".to_string())
                })?,
            }
        };

        let dest = self
            .transaction
            .session_mut(dest_session_id)
            .ok_or_else(|| TreeError::UnknownSession(dest_session_id.clone()))?;
        let grafted = dest
            .tree_mut()
            .graft(dest_node, subtree)
            .ok_or_else(|| TreeError::Inconsistent("destination vanished".to_string()))?;
        let dest_id = dest.id().to_string();
        let new_parent_id = dest.tree().node(dest_node).and_then(|n| n.id().cloned());
        dest.tree_mut().set_parent_id(grafted, new_parent_id);
        dest.tree_mut().mark_attached(grafted, &dest_id);
        dest.index_insert_subtree(grafted);
        let copy = dest
            .tree()
            .copy_subtree(grafted)
            .ok_or_else(|| TreeError::Inconsistent("grafted node vanished".to_string()))?;
        debug!(id = ?source_id, from = %source_session_id, to = %dest_session_id,
               "transferred across sessions");
        Ok(copy)
    }

    /// Graft a subtree into the current session under `parent`, attach it
    /// clean, patch the index, and return a defensive copy.
    fn graft_attached(
        &mut self,
        subtree: Element<K>,
        parent: NodeId,
    ) -> TreeResult<Element<K>, K> {
        let session = self
            .transaction
            .current_session_mut()
            .ok_or(TreeError::NoCurrentSession)?;
        let grafted = session
            .tree_mut()
            .graft(parent, subtree)
            .ok_or_else(|| TreeError::Inconsistent("insertion parent vanished".to_string()))?;
        let session_id = session.id().to_string();
        // Stored parent reference follows the actual insertion point (the
        // requested parent may not exist, in which case the root took it).
        let new_parent_id = session.tree().node(parent).and_then(|n| n.id().cloned());
        session.tree_mut().set_parent_id(grafted, new_parent_id);
        session.tree_mut().mark_attached(grafted, &session_id);
        session.index_insert_subtree(grafted);
        session
            .tree()
            .copy_subtree(grafted)
            .ok_or_else(|| TreeError::Inconsistent("grafted node vanished".to_string()))
    }
}
