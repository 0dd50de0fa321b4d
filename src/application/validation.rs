//! Validation chain framework.
//!
//! Each mutating operation runs an ordered sequence of independently
//! testable handlers against one [`OperationContext`]. Handlers are pure
//! checks: they read the context and either return normally or raise a typed
//! error. The first failure aborts the chain; no mutation happens before the
//! chain completes.

use std::collections::HashSet;

use tracing::trace;

use crate::application::context::OperationContext;
use crate::domain::algorithms;
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::record::Key;
use crate::domain::Operation;

/// A single validation handler.
pub trait Validate<K: Key> {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K>;
}

/// Rejects elements without an identifier. Session roots carry their
/// session's identity and pass; the root guard handles them separately.
pub struct MandatoryId;

impl<K: Key> Validate<K> for MandatoryId {
    fn name(&self) -> &'static str {
        "mandatory-id"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        match ctx.source.node(ctx.source_node) {
            Some(n) if n.id().is_some() || n.is_root() => Ok(()),
            Some(_) => Err(TreeError::InvalidInput(
                "element has no identifier".to_string(),
            )),
            None => Err(TreeError::Inconsistent(
                "source node missing from its tree".to_string(),
            )),
        }
    }
}

/// The synthetic root is never operated on directly.
pub struct ForbidRoot;

impl<K: Key> Validate<K> for ForbidRoot {
    fn name(&self) -> &'static str {
        "forbid-root"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        let is_root = ctx
            .source
            .node(ctx.source_node)
            .map(|n| n.is_root())
            .unwrap_or(false);
        if is_root {
            Err(TreeError::RootOperation {
                operation: ctx.operation,
            })
        } else {
            Ok(())
        }
    }
}

/// The source subtree must report itself attached: every node clean and in
/// state `Attached`. Catches both lifecycle violations and out-of-band
/// mutation flagged by the dirty bit.
pub struct SubtreeAttached;

impl<K: Key> Validate<K> for SubtreeAttached {
    fn name(&self) -> &'static str {
        "subtree-attached"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        if ctx.source.is_attached_from(ctx.source_node) {
            return Ok(());
        }
        match ctx.source.node(ctx.source_node).and_then(|n| n.id()) {
            Some(id) => Err(TreeError::NotAttached(id.clone())),
            None => Err(TreeError::RootOperation {
                operation: ctx.operation,
            }),
        }
    }
}

/// The element and every descendant must be in a state permitting the
/// operation.
pub struct StatePermits;

impl<K: Key> Validate<K> for StatePermits {
    fn name(&self) -> &'static str {
        "state-permits"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        match algorithms::find_state_violation(ctx.source, ctx.source_node, ctx.operation) {
            Some(node) => {
                let state = ctx
                    .source
                    .node(node)
                    .map(|n| n.state())
                    .unwrap_or_default();
                Err(TreeError::InvalidLifecycleState {
                    operation: ctx.operation,
                    state,
                })
            }
            None => Ok(()),
        }
    }
}

/// The element's own state must permit the operation. Descendant states are
/// deliberately not consulted: an updated copy may carry freshly added
/// children, which attach together with the rest of the subtree.
pub struct ElementStatePermits;

impl<K: Key> Validate<K> for ElementStatePermits {
    fn name(&self) -> &'static str {
        "element-state-permits"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        let state = ctx
            .source
            .node(ctx.source_node)
            .map(|n| n.state())
            .unwrap_or_default();
        if state.permits(ctx.operation) {
            Ok(())
        } else {
            Err(TreeError::InvalidLifecycleState {
                operation: ctx.operation,
                state,
            })
        }
    }
}

/// Every payload in the subtree must match the receiving session's declared
/// record type.
pub struct PayloadTypeMatches;

impl<K: Key> Validate<K> for PayloadTypeMatches {
    fn name(&self) -> &'static str {
        "payload-type-matches"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        let Some((expected, expected_name)) = ctx.session_type else {
            return Ok(());
        };
        for handle in algorithms::flatten(ctx.source, ctx.source_node) {
            if let Some(payload) = ctx.source.node(handle).and_then(|n| n.payload()) {
                if payload.record_type() != expected {
                    return Err(TreeError::MismatchedPayloadType {
                        expected: expected_name,
                        actual: payload.record_type_name(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Persist only: no node of the subtree may already belong to a session —
/// a second attach would imply a duplicate.
pub struct NotAttachedElsewhere;

impl<K: Key> Validate<K> for NotAttachedElsewhere {
    fn name(&self) -> &'static str {
        "not-attached-elsewhere"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        for handle in algorithms::flatten(ctx.source, ctx.source_node) {
            if let Some(node) = ctx.source.node(handle) {
                if let (Some(session), Some(id)) = (node.attached_to(), node.id()) {
                    return Err(TreeError::AlreadyAttached {
                        id: id.clone(),
                        session: session.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// No id of the source subtree may already exist in the duplicate-check
/// scope of the target, and the source subtree itself must be free of
/// internal duplicates. Skipped for same-session cuts to the tree root.
pub struct NoDuplicateId;

impl<K: Key> Validate<K> for NoDuplicateId {
    fn name(&self) -> &'static str {
        "no-duplicate-id"
    }

    fn check(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        if ctx.skip_duplicate_check {
            return Ok(());
        }
        if let Some(dup) = algorithms::first_internal_duplicate(ctx.source, ctx.source_node) {
            return Err(TreeError::DuplicateId(dup));
        }
        let Some(target) = &ctx.target else {
            return Ok(());
        };
        let mut target_ids: HashSet<K> = algorithms::subtree_ids(target.tree, target.node)
            .into_iter()
            .collect();
        if let Some(excluded) = ctx.exclude_subtree {
            for id in algorithms::subtree_ids(target.tree, excluded) {
                target_ids.remove(&id);
            }
        }
        match algorithms::subtree_ids(ctx.source, ctx.source_node)
            .into_iter()
            .find(|id| target_ids.contains(id))
        {
            Some(dup) => Err(TreeError::DuplicateId(dup)),
            None => Ok(()),
        }
    }
}

/// Ordered handler sequence for one operation kind.
pub struct ValidationChain<K: Key> {
    validators: Vec<Box<dyn Validate<K>>>,
}

impl<K: Key> ValidationChain<K> {
    /// Assemble the handler set for an operation, in the order the checks
    /// must run.
    pub fn for_operation(operation: Operation) -> Self {
        let validators: Vec<Box<dyn Validate<K>>> = match operation {
            Operation::Cut | Operation::Copy => vec![
                Box::new(MandatoryId),
                Box::new(ForbidRoot),
                Box::new(SubtreeAttached),
                Box::new(NoDuplicateId),
            ],
            Operation::Remove => vec![Box::new(ForbidRoot), Box::new(SubtreeAttached)],
            Operation::Persist => vec![
                Box::new(MandatoryId),
                Box::new(PayloadTypeMatches),
                Box::new(StatePermits),
                Box::new(NotAttachedElsewhere),
                Box::new(NoDuplicateId),
            ],
            Operation::Update => vec![
                Box::new(MandatoryId),
                Box::new(ForbidRoot),
                Box::new(PayloadTypeMatches),
                Box::new(ElementStatePermits),
                Box::new(NoDuplicateId),
            ],
        };
        Self { validators }
    }

    /// Run every handler in order; the first error aborts the chain.
    pub fn run(&self, ctx: &OperationContext<'_, K>) -> TreeResult<(), K> {
        for validator in &self.validators {
            trace!(validator = validator.name(), operation = %ctx.operation);
            validator.check(ctx)?;
        }
        Ok(())
    }
}
