//! Arena-backed element subtrees.
//!
//! An [`Element`] is an owned subtree: a private arena of [`Node`]s plus the
//! handle of its root node. The same type serves as a session's live tree and
//! as the defensive copies handed to callers, so nothing a caller mutates can
//! bypass validation.
//!
//! Structural mutation through the public mutators marks the touched node
//! dirty; an element only reports itself attached again after a sanctioned
//! operation re-attaches the subtree.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::lifecycle::LifecycleState;
use crate::domain::record::{BoxedRecord, Key};
use crate::domain::session::SessionId;

/// Handle of a node within its owning element's arena.
pub type NodeId = Index;

/// A single tree node stored in an element's arena.
#[derive(Debug)]
pub struct Node<K: Key> {
    /// Element identifier; `None` only for a session's synthetic root.
    id: Option<K>,
    is_root: bool,
    /// Id-level parent reference as extracted from the source record.
    /// `None` means the node hangs off the session root.
    parent_id: Option<K>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    payload: Option<BoxedRecord<K>>,
    state: LifecycleState,
    dirty: bool,
    attached_to: Option<SessionId>,
    /// Hash of id+parent captured at the last successful attach.
    fingerprint: u64,
}

impl<K: Key> Node<K> {
    pub(crate) fn new(id: K, parent_id: Option<K>, payload: Option<BoxedRecord<K>>) -> Self {
        Self {
            id: Some(id),
            is_root: false,
            parent_id,
            parent: None,
            children: Vec::new(),
            payload,
            state: LifecycleState::NotExisted,
            dirty: false,
            attached_to: None,
            fingerprint: 0,
        }
    }

    fn new_root() -> Self {
        Self {
            id: None,
            is_root: true,
            parent_id: None,
            parent: None,
            children: Vec::new(),
            payload: None,
            state: LifecycleState::Attached,
            dirty: false,
            attached_to: None,
            fingerprint: 0,
        }
    }

    pub fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn parent_id(&self) -> Option<&K> {
        self.parent_id.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn payload(&self) -> Option<&BoxedRecord<K>> {
        self.payload.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn attached_to(&self) -> Option<&SessionId> {
        self.attached_to.as_ref()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn current_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.parent_id.hash(&mut hasher);
        hasher.finish()
    }

    fn clone_node(&self) -> Self {
        Self {
            id: self.id.clone(),
            is_root: self.is_root,
            parent_id: self.parent_id.clone(),
            parent: None,
            children: Vec::new(),
            payload: self.payload.clone(),
            state: self.state,
            dirty: self.dirty,
            attached_to: self.attached_to.clone(),
            fingerprint: self.fingerprint,
        }
    }
}

/// An owned subtree: arena storage plus a root handle.
#[derive(Debug)]
pub struct Element<K: Key> {
    arena: Arena<Node<K>>,
    root: NodeId,
}

impl<K: Key> Element<K> {
    /// Create a fresh single-node element in state `NotExisted`.
    pub fn new(id: K, parent_id: Option<K>, payload: Option<BoxedRecord<K>>) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(Node::new(id, parent_id, payload));
        Self { arena, root }
    }

    /// Create a synthetic session root.
    pub(crate) fn new_session_root() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(Node::new_root());
        Self { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, node: NodeId) -> Option<&Node<K>> {
        self.arena.get(node)
    }

    /// Identifier of this element's root node (`None` for a session root).
    pub fn id(&self) -> Option<&K> {
        self.node(self.root).and_then(Node::id)
    }

    pub fn parent_id(&self) -> Option<&K> {
        self.node(self.root).and_then(Node::parent_id)
    }

    pub fn payload(&self) -> Option<&BoxedRecord<K>> {
        self.node(self.root).and_then(Node::payload)
    }

    pub fn state(&self) -> LifecycleState {
        self.node(self.root)
            .map(Node::state)
            .unwrap_or(LifecycleState::NotExisted)
    }

    pub fn attached_to(&self) -> Option<&SessionId> {
        self.node(self.root).and_then(Node::attached_to)
    }

    pub fn is_dirty(&self) -> bool {
        self.node(self.root).map(Node::is_dirty).unwrap_or(false)
    }

    /// Lazy recursive check: a subtree is attached only when every node in it
    /// is clean and in state `Attached`.
    pub fn is_attached(&self) -> bool {
        self.is_attached_from(self.root)
    }

    pub(crate) fn is_attached_from(&self, node: NodeId) -> bool {
        match self.node(node) {
            Some(n) => {
                !n.dirty
                    && n.state == LifecycleState::Attached
                    && n.children.iter().all(|&c| self.is_attached_from(c))
            }
            None => false,
        }
    }

    // ------------------------------------------------------------
    // Caller-facing structural mutators: each one marks the node dirty.
    // ------------------------------------------------------------

    pub fn set_element_id(&mut self, node: NodeId, id: K) {
        if let Some(n) = self.arena.get_mut(node) {
            n.id = Some(id);
            n.dirty = true;
        }
    }

    pub fn set_parent_id(&mut self, node: NodeId, parent_id: Option<K>) {
        if let Some(n) = self.arena.get_mut(node) {
            n.parent_id = parent_id;
            n.dirty = true;
        }
    }

    /// Rewrap the node's payload.
    pub fn set_payload(&mut self, node: NodeId, payload: BoxedRecord<K>) {
        if let Some(n) = self.arena.get_mut(node) {
            n.payload = Some(payload);
            n.dirty = true;
        }
    }

    /// Graft `child` under `parent` and mark the parent dirty.
    pub fn add_child(&mut self, parent: NodeId, child: Element<K>) -> Option<NodeId> {
        let grafted = self.graft(parent, child)?;
        if let Some(n) = self.arena.get_mut(parent) {
            n.dirty = true;
        }
        Some(grafted)
    }

    /// Detach the direct child with the given id and mark the parent dirty.
    pub fn remove_child(&mut self, parent: NodeId, child_id: &K) -> Option<Element<K>> {
        let child = self
            .node(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).and_then(Node::id) == Some(child_id))?;
        let extracted = self.extract(child)?;
        if let Some(n) = self.arena.get_mut(parent) {
            n.dirty = true;
        }
        Some(extracted)
    }

    // ------------------------------------------------------------
    // Crate-internal structural operations (sanctioned, no dirty marking).
    // ------------------------------------------------------------

    /// Insert a node without linking it anywhere. Used by the transformation
    /// pipeline before the binding stage wires parents.
    pub(crate) fn insert_orphan(&mut self, node: Node<K>) -> NodeId {
        self.arena.insert(node)
    }

    /// Wire an existing orphan under a parent.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(n) = self.arena.get_mut(child) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.arena.get_mut(parent) {
            p.children.push(child);
        }
    }

    /// Merge another element's nodes under `parent`, returning the handle the
    /// merged subtree's root received in this arena.
    pub(crate) fn graft(&mut self, parent: NodeId, mut sub: Element<K>) -> Option<NodeId> {
        self.arena.get(parent)?;
        let sub_root = sub.root;
        let new_root = move_subtree(&mut sub.arena, sub_root, &mut self.arena, Some(parent))?;
        if let Some(p) = self.arena.get_mut(parent) {
            p.children.push(new_root);
        }
        Some(new_root)
    }

    /// Remove the subtree rooted at `node` into a fresh element.
    pub(crate) fn extract(&mut self, node: NodeId) -> Option<Element<K>> {
        let parent = self.arena.get(node)?.parent;
        if let Some(p) = parent.and_then(|p| self.arena.get_mut(p)) {
            p.children.retain(|&c| c != node);
        }
        let mut arena = Arena::new();
        let root = move_subtree(&mut self.arena, node, &mut arena, None)?;
        Some(Element { arena, root })
    }

    /// Deep copy of the subtree rooted at `node`; node handles are fresh.
    pub(crate) fn copy_subtree(&self, node: NodeId) -> Option<Element<K>> {
        let mut arena = Arena::new();
        let root = clone_subtree(&self.arena, node, &mut arena, None)?;
        Some(Element { arena, root })
    }

    /// Defensive deep copy of the whole element.
    pub fn deep_copy(&self) -> Element<K> {
        self.copy_subtree(self.root).unwrap_or_else(|| {
            // The root handle is owned by this arena, so this branch is
            // unreachable; an empty single-root element keeps the API total.
            Element::new_session_root()
        })
    }

    /// Mark the subtree attached to `session`: clears dirty flags, snapshots
    /// fingerprints, stamps ownership.
    #[instrument(level = "trace", skip(self, session))]
    pub(crate) fn mark_attached(&mut self, from: NodeId, session: &SessionId) {
        let children = match self.arena.get_mut(from) {
            Some(n) => {
                n.state = LifecycleState::Attached;
                n.dirty = false;
                n.attached_to = Some(session.clone());
                n.fingerprint = n.current_fingerprint();
                n.children.clone()
            }
            None => return,
        };
        for child in children {
            self.mark_attached(child, session);
        }
    }

    /// Mark the subtree detached and clear session ownership.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn mark_detached(&mut self, from: NodeId) {
        let children = match self.arena.get_mut(from) {
            Some(n) => {
                n.state = LifecycleState::Detached;
                n.dirty = false;
                n.attached_to = None;
                n.children.clone()
            }
            None => return,
        };
        for child in children {
            self.mark_detached(child);
        }
    }

    // ------------------------------------------------------------
    // Traversal and inspection.
    // ------------------------------------------------------------

    /// Pre-order iterator over the subtree reachable from the root.
    pub fn iter(&self) -> ElementIter<'_, K> {
        ElementIter::new(self)
    }

    /// Post-order iterator (leaves before their parents).
    pub fn iter_postorder(&self) -> PostOrderIter<'_, K> {
        PostOrderIter::new(self)
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    pub fn depth(&self) -> usize {
        self.depth_from(self.root)
    }

    fn depth_from(&self, node: NodeId) -> usize {
        match self.node(node) {
            Some(n) => {
                1 + n
                    .children
                    .iter()
                    .map(|&c| self.depth_from(c))
                    .max()
                    .unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Identifiers of all leaf nodes (session roots excluded).
    pub fn leaf_ids(&self) -> Vec<K> {
        let mut leaves = Vec::new();
        self.collect_leaf_ids(self.root, &mut leaves);
        leaves
    }

    fn collect_leaf_ids(&self, node: NodeId, leaves: &mut Vec<K>) {
        if let Some(n) = self.node(node) {
            if n.children.is_empty() {
                if let Some(id) = &n.id {
                    leaves.push(id.clone());
                }
            } else {
                for &child in &n.children {
                    self.collect_leaf_ids(child, leaves);
                }
            }
        }
    }

    /// Render the subtree for display.
    pub fn render(&self) -> Tree<String> {
        self.render_from(self.root)
    }

    fn render_from(&self, node: NodeId) -> Tree<String> {
        match self.node(node) {
            Some(n) => {
                let label = match &n.id {
                    Some(id) => format!("{:?}", id),
                    None => "<root>".to_string(),
                };
                let leaves: Vec<_> = n.children.iter().map(|&c| self.render_from(c)).collect();
                Tree::new(label).with_leaves(leaves)
            }
            None => Tree::new(String::from("<missing>")),
        }
    }
}

impl<K: Key> fmt::Display for Element<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Move the subtree rooted at `id` from `src` into `dst` under `new_parent`.
/// The caller is responsible for registering the returned handle with the
/// destination parent's child list.
fn move_subtree<K: Key>(
    src: &mut Arena<Node<K>>,
    id: NodeId,
    dst: &mut Arena<Node<K>>,
    new_parent: Option<NodeId>,
) -> Option<NodeId> {
    let mut node = src.remove(id)?;
    let children = std::mem::take(&mut node.children);
    node.parent = new_parent;
    let new_id = dst.insert(node);
    let mut new_children = Vec::with_capacity(children.len());
    for child in children {
        if let Some(c) = move_subtree(src, child, dst, Some(new_id)) {
            new_children.push(c);
        }
    }
    if let Some(n) = dst.get_mut(new_id) {
        n.children = new_children;
    }
    Some(new_id)
}

fn clone_subtree<K: Key>(
    src: &Arena<Node<K>>,
    id: NodeId,
    dst: &mut Arena<Node<K>>,
    new_parent: Option<NodeId>,
) -> Option<NodeId> {
    let node = src.get(id)?;
    let children = node.children.clone();
    let mut copy = node.clone_node();
    copy.parent = new_parent;
    let new_id = dst.insert(copy);
    let mut new_children = Vec::with_capacity(children.len());
    for child in children {
        if let Some(c) = clone_subtree(src, child, dst, Some(new_id)) {
            new_children.push(c);
        }
    }
    if let Some(n) = dst.get_mut(new_id) {
        n.children = new_children;
    }
    Some(new_id)
}

pub struct ElementIter<'a, K: Key> {
    tree: &'a Element<K>,
    stack: Vec<NodeId>,
}

impl<'a, K: Key> ElementIter<'a, K> {
    fn new(tree: &'a Element<K>) -> Self {
        Self {
            tree,
            stack: vec![tree.root()],
        }
    }
}

impl<'a, K: Key> Iterator for ElementIter<'a, K> {
    type Item = (NodeId, &'a Node<K>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.tree.node(current) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current, node));
            }
        }
        None
    }
}

pub struct PostOrderIter<'a, K: Key> {
    tree: &'a Element<K>,
    stack: Vec<(NodeId, bool)>,
}

impl<'a, K: Key> PostOrderIter<'a, K> {
    fn new(tree: &'a Element<K>) -> Self {
        Self {
            tree,
            stack: vec![(tree.root(), false)],
        }
    }
}

impl<'a, K: Key> Iterator for PostOrderIter<'a, K> {
    type Item = (NodeId, &'a Node<K>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.node(current) {
                if !visited {
                    self.stack.push((current, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current, node));
                }
            }
        }
        None
    }
}
