//! Transformation pipeline: flat record collection to attached tree.
//!
//! Five ordered stages share one [`PipelineContext`]; a failing stage aborts
//! the run and the partially built session is simply dropped, never
//! registered — the transformation is all-or-nothing. The record-capability
//! markers are compile-time (the `Record` impl), so pre-validation only
//! carries the runtime checks: empty input, missing ids, duplicate ids.

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::context::PipelineContext;
use crate::domain::element::Node;
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::record::Key;
use crate::domain::session::Session;

/// One pipeline stage. Stages enrich the shared context and abort the whole
/// run by returning an error instead of reaching the next stage.
pub trait Stage<K: Key> {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K>;
}

/// Stage 1: reject inputs the later stages cannot work with.
struct PreValidation;

impl<K: Key> Stage<K> for PreValidation {
    fn name(&self) -> &'static str {
        "pre-validation"
    }

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K> {
        if ctx.records.is_empty() {
            return Err(TreeError::InvalidInput(
                "empty record collection".to_string(),
            ));
        }
        let mut ids = Vec::with_capacity(ctx.records.len());
        for record in &ctx.records {
            match record.identifier() {
                Some(id) => ids.push(id),
                None => {
                    return Err(TreeError::InvalidInput(
                        "record without identifier".to_string(),
                    ))
                }
            }
        }
        if let Some(dup) = ids.iter().duplicates().next() {
            return Err(TreeError::DuplicateId(dup.clone()));
        }
        Ok(())
    }
}

/// Stage 2: read every record's id and parent id into the two parallel maps.
/// Access failure here is unreachable after stage 1 and treated as a fatal
/// internal error.
struct Extraction;

impl<K: Key> Stage<K> for Extraction {
    fn name(&self) -> &'static str {
        "extraction"
    }

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K> {
        for (position, record) in ctx.records.iter().enumerate() {
            let id = record.identifier().ok_or_else(|| {
                TreeError::Inconsistent("identifier vanished after pre-validation".to_string())
            })?;
            ctx.parents.insert(id.clone(), record.parent_identifier());
            ctx.positions.insert(id.clone(), position);
            ctx.ids.push(id);
        }
        Ok(())
    }
}

/// Stage 3: open the session and create one unattached node per record.
struct Initialization;

impl<K: Key> Stage<K> for Initialization {
    fn name(&self) -> &'static str {
        "initialization"
    }

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K> {
        let mut session = Session::with_type(
            ctx.session_id.clone(),
            ctx.payload_type,
            ctx.type_name,
        );
        for id in &ctx.ids {
            let position = ctx.positions[id];
            let parent = ctx.parents[id].clone();
            let node = Node::new(id.clone(), parent, Some(ctx.records[position].clone()));
            let handle = session.tree_mut().insert_orphan(node);
            ctx.nodes.insert(id.clone(), handle);
        }
        ctx.session = Some(session);
        Ok(())
    }
}

/// Stage 4: wire each node under its parent when the parent is part of the
/// created set; everything else becomes a first-level node.
struct Binding;

impl<K: Key> Stage<K> for Binding {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K> {
        let session = ctx
            .session
            .as_mut()
            .ok_or_else(|| TreeError::Inconsistent("binding before initialization".to_string()))?;
        for id in &ctx.ids {
            let handle = ctx.nodes[id];
            let parent_handle = match &ctx.parents[id] {
                // A node must not become its own parent.
                Some(pid) if pid != id => ctx.nodes.get(pid).copied(),
                _ => None,
            };
            match parent_handle {
                Some(parent) => session.tree_mut().link(parent, handle),
                None => ctx.first_level.push(handle),
            }
        }
        Ok(())
    }
}

/// Stage 5: cross-check the assembled tree against the extracted maps before
/// the session is exposed. Under correct operation this never fails; a
/// failure signals an assembly bug (or cyclic parent references, which leave
/// nodes unreachable from any first-level root).
struct PostValidation;

impl<K: Key> Stage<K> for PostValidation {
    fn name(&self) -> &'static str {
        "post-validation"
    }

    fn run(&self, ctx: &mut PipelineContext<K>) -> TreeResult<(), K> {
        let session = ctx.session.as_ref().ok_or_else(|| {
            TreeError::Inconsistent("post-validation before initialization".to_string())
        })?;
        let tree = session.tree();

        let reachable: usize = ctx
            .first_level
            .iter()
            .map(|&n| crate::domain::algorithms::flatten(tree, n).len())
            .sum();
        if reachable != ctx.records.len() {
            return Err(TreeError::Inconsistent(format!(
                "assembled {} elements from {} records",
                reachable,
                ctx.records.len()
            )));
        }

        for id in &ctx.ids {
            let node = tree.node(ctx.nodes[id]).ok_or_else(|| {
                TreeError::Inconsistent("created node missing from arena".to_string())
            })?;
            if node.parent_id() != ctx.parents[id].as_ref() {
                return Err(TreeError::Inconsistent(format!(
                    "parent reference drifted for {:?}",
                    id
                )));
            }
            let original = &ctx.records[ctx.positions[id]];
            let intact = node
                .payload()
                .map(|p| p.eq_record(original.as_ref()))
                .unwrap_or(false);
            if !intact {
                return Err(TreeError::Inconsistent(format!(
                    "payload drifted for {:?}",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// The five-stage transformation pipeline.
pub struct TransformationPipeline<K: Key> {
    stages: Vec<Box<dyn Stage<K>>>,
}

impl<K: Key> Default for TransformationPipeline<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> TransformationPipeline<K> {
    pub fn new() -> Self {
        Self {
            stages: vec![
                Box::new(PreValidation),
                Box::new(Extraction),
                Box::new(Initialization),
                Box::new(Binding),
                Box::new(PostValidation),
            ],
        }
    }

    /// Run all stages, then commit: first-level nodes are reparented onto
    /// the synthetic root, the whole tree is attached, the index built and
    /// the session activated. The caller registers the returned session.
    #[instrument(level = "debug", skip(self, ctx), fields(session = %ctx.session_id))]
    pub fn run(&self, mut ctx: PipelineContext<K>) -> TreeResult<Session<K>, K> {
        for stage in &self.stages {
            debug!(stage = stage.name(), "running pipeline stage");
            stage.run(&mut ctx)?;
        }
        self.commit(ctx)
    }

    fn commit(&self, ctx: PipelineContext<K>) -> TreeResult<Session<K>, K> {
        let mut session = ctx
            .session
            .ok_or_else(|| TreeError::Inconsistent("commit without a session".to_string()))?;
        let root = session.tree().root();
        for handle in ctx.first_level {
            session.tree_mut().link(root, handle);
        }
        session.attach_all();
        session.rebuild_index();
        session.set_active(true);
        debug!(
            session = session.id(),
            elements = session.element_count(),
            "transformation committed"
        );
        Ok(session)
    }
}
