//! Pointer-relinking mutations.
//!
//! Every public mutation runs against a staged copy of the chain, re-validates
//! it, and only then replaces `self`. A rejected mutation leaves the chain
//! exactly as it was.

use super::{Chain, Materialized};
use crate::error::{EngineError, IntegrityViolation, Result};
use crate::model::{Node, NodeId};

impl<T: Clone> Chain<T> {
    /// Links `node` after the current tail (or as the head of an empty chain).
    pub fn append(&mut self, node: Node<T>) -> Result<()> {
        self.ensure_new(&node)?;
        self.stage(|chain| {
            match chain.order().last().cloned() {
                Some(tail) => chain.link_after(&tail, node),
                None => chain.link_head(node),
            }
            Ok(())
        })
    }

    /// Splices `node` between `anchor` and the anchor's current successor.
    pub fn insert_after(&mut self, anchor: &NodeId, node: Node<T>) -> Result<()> {
        if !self.contains(anchor) {
            return Err(EngineError::not_found("node", anchor));
        }
        self.ensure_new(&node)?;
        self.stage(|chain| {
            chain.link_after(anchor, node);
            Ok(())
        })
    }

    /// Makes `node` the new head.
    pub fn insert_at_head(&mut self, node: Node<T>) -> Result<()> {
        self.ensure_new(&node)?;
        self.stage(|chain| {
            chain.link_head(node);
            Ok(())
        })
    }

    /// Unlinks and returns the node, joining its former neighbours.
    pub fn remove(&mut self, id: &NodeId) -> Result<Node<T>> {
        if !self.contains(id) {
            return Err(EngineError::not_found("node", id));
        }
        self.stage(|chain| chain.unlink(id))
    }

    /// Moves a node so it ends up at `target_index` in the materialized order.
    ///
    /// Returns `Ok(false)` without touching anything when the node is already
    /// there or the index is out of range.
    pub fn move_to_index(&mut self, id: &NodeId, target_index: usize) -> Result<bool> {
        let materialized = self.materialize();
        let current = materialized
            .position(id)
            .ok_or_else(|| EngineError::not_found("node", id))?;

        if target_index == current || target_index >= materialized.order.len() {
            return Ok(false);
        }

        self.stage(|chain| {
            let node = chain.unlink(id)?;
            if target_index == 0 {
                chain.link_head(node);
            } else {
                let anchor = chain.order().get(target_index - 1).cloned().ok_or_else(|| {
                    EngineError::integrity(
                        chain.scope.clone(),
                        IntegrityViolation::Unreachable(target_index),
                    )
                })?;
                chain.link_after(&anchor, node);
            }
            Ok(true)
        })
    }

    /// Rewrites every pointer to follow the current materialized order.
    ///
    /// Duplicate ids are dropped (first occurrence kept). Returns the
    /// materialization the repair was based on.
    pub fn relink(&mut self) -> Materialized {
        let before = self.materialize();

        let mut kept: Vec<Node<T>> = Vec::with_capacity(before.order.len());
        for id in &before.order {
            if let Some(node) = self.get(id) {
                kept.push(node.clone());
            }
        }

        let ids: Vec<NodeId> = kept.iter().map(|n| n.id.clone()).collect();
        for (i, node) in kept.iter_mut().enumerate() {
            node.previous = i.checked_sub(1).map(|p| ids[p].clone());
            node.next = ids.get(i + 1).cloned();
        }

        self.nodes = kept;
        self.refresh_order_hints();
        before
    }

    // ------------------------------------------------------------------------
    // Staging and raw pointer surgery
    // ------------------------------------------------------------------------

    fn stage<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        staged.validate()?;
        staged.refresh_order_hints();
        *self = staged;
        Ok(out)
    }

    fn ensure_new(&self, node: &Node<T>) -> Result<()> {
        if self.contains(&node.id) {
            return Err(EngineError::integrity(
                self.scope.clone(),
                IntegrityViolation::DuplicateId(node.id.clone()),
            ));
        }
        Ok(())
    }

    fn refresh_order_hints(&mut self) {
        let order = self.order();
        for node in &mut self.nodes {
            node.order = order
                .iter()
                .position(|id| id == &node.id)
                .map(|i| u32::try_from(i).unwrap_or(u32::MAX));
        }
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node<T>> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    fn link_after(&mut self, anchor: &NodeId, mut node: Node<T>) {
        let successor = self
            .node_mut(anchor)
            .and_then(|a| a.next.replace(node.id.clone()));
        if let Some(next) = successor.as_ref().and_then(|s| self.node_mut(s)) {
            next.previous = Some(node.id.clone());
        }
        node.previous = Some(anchor.clone());
        node.next = successor;
        self.nodes.push(node);
    }

    fn link_head(&mut self, mut node: Node<T>) {
        let head = self.order().first().cloned();
        if let Some(old) = head.as_ref().and_then(|h| self.node_mut(h)) {
            old.previous = Some(node.id.clone());
        }
        node.previous = None;
        node.next = head;
        self.nodes.push(node);
    }

    fn unlink(&mut self, id: &NodeId) -> Result<Node<T>> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| EngineError::not_found("node", id))?;
        let mut node = self.nodes.remove(index);

        let previous = node.previous.take();
        let next = node.next.take();
        if let Some(p) = previous.as_ref().and_then(|p| self.node_mut(p)) {
            p.next.clone_from(&next);
        }
        if let Some(n) = next.as_ref().and_then(|n| self.node_mut(n)) {
            n.previous = previous;
        }
        Ok(node)
    }
}
