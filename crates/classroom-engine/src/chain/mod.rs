//! Per-scope linked chains of nodes.
//!
//! A [`Chain`] owns every node of one scope (an arena keyed by id) and treats
//! `previous`/`next` as ids into that set. The same type backs module chains
//! and exercise chains at all four tiers.

mod materialize;
mod mutate;

use std::collections::{HashMap, HashSet};

pub use materialize::{materialize, Materialized};

use crate::error::{EngineError, IntegrityViolation, Result};
use crate::model::{Node, NodeId, ScopeId};

/// All nodes of one scope, in storage (input) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain<T> {
    scope: ScopeId,
    nodes: Vec<Node<T>>,
}

impl<T: Clone> Chain<T> {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            nodes: Vec::new(),
        }
    }

    /// Builds a chain from stored nodes, dropping those of other scopes.
    #[must_use]
    pub fn from_nodes(scope: ScopeId, nodes: Vec<Node<T>>) -> Self {
        let nodes = nodes.into_iter().filter(|n| n.scope_id == scope).collect();
        Self { scope, nodes }
    }

    /// The chain's scope.
    #[must_use]
    pub const fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Nodes in storage order.
    #[must_use]
    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    /// Consumes the chain, returning its nodes.
    #[must_use]
    pub fn into_nodes(self) -> Vec<Node<T>> {
        self.nodes
    }

    /// Number of stored nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the chain holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node<T>> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Returns `true` if `id` is part of this chain.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Applies `f` to a node's payload. Pointers stay untouched.
    ///
    /// Returns `false` if the node is not in the chain.
    pub fn update_body(&mut self, id: &NodeId, f: impl FnOnce(&mut T)) -> bool {
        match self.nodes.iter_mut().find(|n| &n.id == id) {
            Some(node) => {
                f(&mut node.body);
                true
            }
            None => false,
        }
    }

    /// Materializes the chain.
    #[must_use]
    pub fn materialize(&self) -> Materialized {
        materialize(&self.scope, &self.nodes)
    }

    /// Node ids in chain order.
    #[must_use]
    pub fn order(&self) -> Vec<NodeId> {
        self.materialize().order
    }

    /// Nodes in chain order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Node<T>> {
        self.order().iter().filter_map(|id| self.get(id)).collect()
    }

    /// Returns `true` if `node` has no `previous` resolving in this scope.
    #[must_use]
    pub fn is_head(&self, node: &Node<T>) -> bool {
        node.previous.as_ref().map_or(true, |p| !self.contains(p))
    }

    /// Returns `true` if `node` has a `previous` that does not resolve in this scope.
    #[must_use]
    pub fn is_orphan(&self, node: &Node<T>) -> bool {
        node.previous.as_ref().is_some_and(|p| !self.contains(p))
    }

    /// Checks that the pointers form exactly one acyclic, mirrored chain
    /// covering every node.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(|v| EngineError::integrity(self.scope.clone(), v))
    }

    fn check(&self) -> std::result::Result<(), IntegrityViolation> {
        if self.nodes.is_empty() {
            return Ok(());
        }

        let mut by_id: HashMap<&NodeId, &Node<T>> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.scope_id != self.scope {
                return Err(IntegrityViolation::ForeignScope(node.id.clone()));
            }
            if by_id.insert(&node.id, node).is_some() {
                return Err(IntegrityViolation::DuplicateId(node.id.clone()));
            }
        }

        for node in &self.nodes {
            for target in [&node.previous, &node.next].into_iter().flatten() {
                if !by_id.contains_key(target) {
                    return Err(IntegrityViolation::DanglingPointer {
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
            if let Some(next) = node.next.as_ref().and_then(|n| by_id.get(n)) {
                if next.previous.as_ref() != Some(&node.id) {
                    return Err(IntegrityViolation::AsymmetricLink {
                        from: node.id.clone(),
                        to: next.id.clone(),
                    });
                }
            }
            if let Some(previous) = node.previous.as_ref().and_then(|p| by_id.get(p)) {
                if previous.next.as_ref() != Some(&node.id) {
                    return Err(IntegrityViolation::AsymmetricLink {
                        from: node.id.clone(),
                        to: previous.id.clone(),
                    });
                }
            }
        }

        let heads: Vec<&Node<T>> = self.nodes.iter().filter(|n| n.previous.is_none()).collect();
        let head = match heads.as_slice() {
            [] => return Err(IntegrityViolation::NoHead),
            [head] => *head,
            many => return Err(IntegrityViolation::MultipleHeads(many.len())),
        };

        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut cursor = Some(head);
        while let Some(node) = cursor {
            if !visited.insert(&node.id) {
                return Err(IntegrityViolation::Cycle(node.id.clone()));
            }
            cursor = node.next.as_ref().and_then(|n| by_id.get(n).copied());
        }

        match self.nodes.len() - visited.len() {
            0 => Ok(()),
            missing => Err(IntegrityViolation::Unreachable(missing)),
        }
    }
}
