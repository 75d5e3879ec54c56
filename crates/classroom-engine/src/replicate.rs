//! Tier replication: copying a chain into a new owning scope.
//!
//! Copies get fresh ids and a `source_ref` back to the original. Replication is
//! safe to retry: a source node that already has a copy in the target scope is
//! skipped, and missing copies are spliced in right after the copy of their
//! source predecessor, so the relative order always matches the source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::chain::Chain;
use crate::error::{EngineError, Result};
use crate::model::{Node, NodeId, Tier};

// ============================================================================
// Id generation
// ============================================================================

/// Source of fresh node ids.
pub trait IdGenerator: Send + Sync + std::fmt::Debug {
    /// Returns an id never returned before.
    fn next_id(&self) -> NodeId;
}

/// Random v4 UUID ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> NodeId {
        NodeId::new(Uuid::new_v4().to_string())
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... ids.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator whose ids start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> NodeId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        NodeId::new(format!("{}-{n}", self.prefix))
    }
}

// ============================================================================
// Report
// ============================================================================

/// A source node paired with its copy in the target scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyPair {
    /// The original node.
    pub source: NodeId,
    /// Its copy in the target scope.
    pub copy: NodeId,
}

/// Outcome of one replication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationReport {
    /// Copies created by this pass, in source order.
    pub created: Vec<CopyPair>,
    /// Source nodes already copied by an earlier pass.
    pub skipped: Vec<CopyPair>,
}

impl ReplicationReport {
    /// Every source/copy pair, created or pre-existing.
    pub fn pairs(&self) -> impl Iterator<Item = &CopyPair> {
        self.created.iter().chain(&self.skipped)
    }

    /// The copy of `source`, if the pass saw it.
    #[must_use]
    pub fn copy_of(&self, source: &NodeId) -> Option<&NodeId> {
        self.pairs().find(|p| &p.source == source).map(|p| &p.copy)
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.created.extend(other.created);
        self.skipped.extend(other.skipped);
    }

    /// Returns `true` if nothing new was copied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

// ============================================================================
// Replication
// ============================================================================

/// Copies `source` into `target`, reproducing its order.
///
/// Missing copies that fall between existing ones are spliced after the copy
/// of their source predecessor; copies of sources past the last existing copy
/// go after the target's current tail.
///
/// `seed` produces the payload of each copy from its original; use it to reset
/// progress or set tier-specific references. The source is never modified, and
/// `target` is only replaced once every copy has been linked and validated.
pub fn replicate<T: Clone>(
    source: &Chain<T>,
    target: &mut Chain<T>,
    tier: Tier,
    ids: &dyn IdGenerator,
    mut seed: impl FnMut(&Node<T>) -> T,
) -> Result<ReplicationReport> {
    if source.scope() == target.scope() {
        return Err(EngineError::invalid_input(format!(
            "cannot replicate scope '{}' into itself",
            source.scope()
        )));
    }

    let mut existing: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for node in target.nodes() {
        if let Some(source_ref) = &node.source_ref {
            existing.entry(source_ref).or_default().push(&node.id);
        }
    }

    let ordered = source.ordered();
    // sources past the last one already copied are appended after the target's
    // tail, which need not be the copy of their source predecessor
    let first_trailing = ordered
        .iter()
        .rposition(|n| existing.contains_key(&n.id))
        .map_or(0, |i| i + 1);
    let tail = target.order().last().cloned();

    let mut report = ReplicationReport::default();
    let mut staged = target.clone();
    let mut previous_copy: Option<NodeId> = None;

    for (position, original) in ordered.into_iter().enumerate() {
        if position == first_trailing {
            previous_copy.clone_from(&tail);
        }
        match existing.get(&original.id).map(Vec::as_slice) {
            Some([copy]) => {
                report.skipped.push(CopyPair {
                    source: original.id.clone(),
                    copy: (*copy).clone(),
                });
                previous_copy = Some((*copy).clone());
                continue;
            }
            Some(copies) if copies.len() > 1 => {
                return Err(EngineError::replication_conflict(
                    target.scope().clone(),
                    original.id.clone(),
                    copies.len(),
                ));
            }
            _ => {}
        }

        let copy = Node {
            id: ids.next_id(),
            scope_id: target.scope().clone(),
            tier,
            previous: None,
            next: None,
            order: original.order,
            source_ref: Some(original.id.clone()),
            created_at: Utc::now(),
            body: seed(original),
        };
        let copy_id = copy.id.clone();

        match &previous_copy {
            Some(anchor) => staged.insert_after(anchor, copy)?,
            None => staged.insert_at_head(copy)?,
        }

        report.created.push(CopyPair {
            source: original.id.clone(),
            copy: copy_id.clone(),
        });
        previous_copy = Some(copy_id);
    }

    *target = staged;
    Ok(report)
}
