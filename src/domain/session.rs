//! Sessions and the transaction registry.
//!
//! A session is one isolated tree plus its id index and activation state.
//! The transaction owns the session table and the notion of "current
//! session"; it lives as long as the manager that created it.

use std::any::TypeId;
use std::collections::HashMap;

use termtree::Tree;
use tracing::{debug, instrument};

use crate::domain::element::{Element, NodeId};
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::record::{Key, Record};

pub type SessionId = String;

/// One isolated tree: synthetic root, id index, activation flag and the
/// record type the session was initialized with.
#[derive(Debug)]
pub struct Session<K: Key> {
    id: SessionId,
    active: bool,
    tree: Element<K>,
    /// Every attached element by id, for O(1) lookup. Patched on every
    /// structural change.
    index: HashMap<K, NodeId>,
    payload_type: TypeId,
    type_name: &'static str,
}

impl<K: Key> Session<K> {
    pub(crate) fn new<R: Record<Key = K>>(id: SessionId) -> Self {
        Self::with_type(id, TypeId::of::<R>(), std::any::type_name::<R>())
    }

    pub(crate) fn with_type(
        id: SessionId,
        payload_type: TypeId,
        type_name: &'static str,
    ) -> Self {
        Self {
            id,
            active: false,
            tree: Element::new_session_root(),
            index: HashMap::new(),
            payload_type,
            type_name,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn tree(&self) -> &Element<K> {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Element<K> {
        &mut self.tree
    }

    pub fn payload_type(&self) -> TypeId {
        self.payload_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// O(1) lookup of an attached element's node handle.
    pub fn lookup(&self, id: &K) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    pub fn contains_id(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    /// Number of attached elements, the synthetic root excluded.
    pub fn element_count(&self) -> usize {
        self.index.len()
    }

    /// Rebuild the whole index from the tree.
    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        let entries: Vec<(K, NodeId)> = self
            .tree
            .iter()
            .filter_map(|(handle, node)| node.id().cloned().map(|id| (id, handle)))
            .collect();
        self.index.extend(entries);
    }

    /// Patch the index with every id in the subtree rooted at `node`.
    pub(crate) fn index_insert_subtree(&mut self, node: NodeId) {
        let entries: Vec<(K, NodeId)> = crate::domain::algorithms::flatten(&self.tree, node)
            .into_iter()
            .filter_map(|h| self.tree.node(h).and_then(|n| n.id().cloned().map(|id| (id, h))))
            .collect();
        self.index.extend(entries);
    }

    pub(crate) fn index_remove_ids(&mut self, ids: &[K]) {
        for id in ids {
            self.index.remove(id);
        }
    }

    /// Attach the whole tree to this session (clears dirty flags, snapshots
    /// fingerprints, stamps ownership).
    pub(crate) fn attach_all(&mut self) {
        let root = self.tree.root();
        let id = self.id.clone();
        self.tree.mark_attached(root, &id);
    }

    /// Deep copy into a new session: fresh node identities, same ids,
    /// parents and payloads, ownership restamped to the new id.
    pub(crate) fn deep_clone_as(&self, new_id: SessionId) -> Session<K> {
        let mut clone = Session {
            id: new_id,
            active: self.active,
            tree: self.tree.deep_copy(),
            index: HashMap::new(),
            payload_type: self.payload_type,
            type_name: self.type_name,
        };
        clone.attach_all();
        clone.rebuild_index();
        clone
    }

    /// Render the session tree with the session id as root label.
    pub fn render(&self) -> Tree<String> {
        let mut tree = self.tree.render();
        tree.root = self.id.clone();
        tree
    }
}

/// Registry of sessions plus the current-session pointer.
#[derive(Debug, Default)]
pub struct Transaction<K: Key> {
    sessions: HashMap<SessionId, Session<K>>,
    current: Option<SessionId>,
}

impl<K: Key> Transaction<K> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            current: None,
        }
    }

    /// Manual-build mode: open an empty tree typed by `R` and make it
    /// current.
    #[instrument(level = "debug", skip(self))]
    pub fn initialize_session<R: Record<Key = K>>(
        &mut self,
        id: &str,
    ) -> TreeResult<&Session<K>, K> {
        self.reserve_session_id(id)?;
        let mut session = Session::new::<R>(id.to_string());
        session.set_active(true);
        debug!(session = id, "initialized empty session");
        Ok(self.commit_session(session))
    }

    /// Fail early when a session id is empty or already taken.
    pub(crate) fn reserve_session_id(&self, id: &str) -> TreeResult<(), K> {
        if id.is_empty() {
            return Err(TreeError::InvalidInput("empty session id".to_string()));
        }
        if self.sessions.contains_key(id) {
            return Err(TreeError::DuplicateSessionId(id.to_string()));
        }
        Ok(())
    }

    /// Register a fully built session and make it current.
    pub(crate) fn commit_session(&mut self, session: Session<K>) -> &Session<K> {
        let id = session.id().to_string();
        self.current = Some(id.clone());
        self.sessions.entry(id).or_insert(session)
    }

    /// Return the session and make it current if found.
    #[instrument(level = "debug", skip(self))]
    pub fn session_checkout(&mut self, id: &str) -> Option<&Session<K>> {
        if self.sessions.contains_key(id) {
            self.current = Some(id.to_string());
            self.sessions.get(id)
        } else {
            None
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn destroy_session(&mut self, id: &str) -> TreeResult<(), K> {
        if self.sessions.remove(id).is_none() {
            return Err(TreeError::UnknownSession(id.to_string()));
        }
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        debug!(session = id, "destroyed session");
        Ok(())
    }

    pub fn destroy_current_session(&mut self) -> TreeResult<(), K> {
        let id = self.current.clone().ok_or(TreeError::NoCurrentSession)?;
        self.destroy_session(&id)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn destroy_all_sessions(&mut self) {
        self.sessions.clear();
        self.current = None;
    }

    /// Toggle the active flag of one session; other sessions and the current
    /// pointer are untouched.
    pub fn activate_session(&mut self, id: &str) -> TreeResult<(), K> {
        self.set_session_active(id, true)
    }

    pub fn deactivate_session(&mut self, id: &str) -> TreeResult<(), K> {
        self.set_session_active(id, false)
    }

    pub fn activate_current_session(&mut self) -> TreeResult<(), K> {
        let id = self.current.clone().ok_or(TreeError::NoCurrentSession)?;
        self.set_session_active(&id, true)
    }

    pub fn deactivate_current_session(&mut self) -> TreeResult<(), K> {
        let id = self.current.clone().ok_or(TreeError::NoCurrentSession)?;
        self.set_session_active(&id, false)
    }

    fn set_session_active(&mut self, id: &str, active: bool) -> TreeResult<(), K> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownSession(id.to_string()))?;
        session.set_active(active);
        Ok(())
    }

    /// All registered sessions, in no particular order.
    pub fn sessions(&self) -> Vec<&Session<K>> {
        self.sessions.values().collect()
    }

    pub fn session(&self, id: &str) -> Option<&Session<K>> {
        self.sessions.get(id)
    }

    pub(crate) fn session_mut(&mut self, id: &str) -> Option<&mut Session<K>> {
        self.sessions.get_mut(id)
    }

    /// Deep-copy `source_id` under `new_id`. Returns `None` when the new id
    /// is empty or the source does not exist; an already-taken new id is an
    /// error.
    #[instrument(level = "debug", skip(self))]
    pub fn clone_session(
        &mut self,
        source_id: &str,
        new_id: &str,
    ) -> TreeResult<Option<&Session<K>>, K> {
        if new_id.is_empty() {
            return Ok(None);
        }
        if self.sessions.contains_key(new_id) {
            return Err(TreeError::DuplicateSessionId(new_id.to_string()));
        }
        let clone = match self.sessions.get(source_id) {
            Some(source) => source.deep_clone_as(new_id.to_string()),
            None => return Ok(None),
        };
        debug!(source = source_id, clone = new_id, "cloned session");
        self.sessions.insert(new_id.to_string(), clone);
        Ok(self.sessions.get(new_id))
    }

    pub fn current_session(&self) -> Option<&Session<K>> {
        self.current.as_ref().and_then(|id| self.sessions.get(id))
    }

    pub(crate) fn current_session_mut(&mut self) -> Option<&mut Session<K>> {
        let id = self.current.clone()?;
        self.sessions.get_mut(&id)
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub(crate) fn set_current(&mut self, id: Option<SessionId>) {
        self.current = id;
    }
}
