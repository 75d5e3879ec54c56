//! Pointer chain to ordered sequence.
//!
//! Materialization never fails: duplicates collapse, orphans are appended,
//! and a scope with no usable head falls back to timestamp order.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{Node, NodeId, ScopeId};

/// Result of materializing one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialized {
    /// Every distinct node id of the scope, in chain order.
    pub order: Vec<NodeId>,

    /// Ids that appeared more than once in the input (first occurrence kept).
    pub duplicates: Vec<NodeId>,

    /// Nodes that were not reachable from the head and were appended.
    pub orphans: Vec<NodeId>,

    /// Number of nodes that qualified as head.
    pub head_candidates: usize,

    /// `true` when no head existed and timestamp ordering was used.
    pub fallback: bool,
}

impl Materialized {
    /// Returns `true` when the pointers described a single clean chain.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
            && self.orphans.is_empty()
            && !self.fallback
            && self.head_candidates <= 1
    }

    /// Position of `id` in the order.
    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == id)
    }
}

/// Orders the nodes of `scope` by following their `next` pointers.
///
/// Nodes outside `scope` are ignored. The returned order is a permutation of
/// the distinct in-scope ids and is deterministic for a given input order.
pub fn materialize<T>(scope: &ScopeId, nodes: &[Node<T>]) -> Materialized {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut unique: Vec<&Node<T>> = Vec::new();

    for node in nodes.iter().filter(|n| &n.scope_id == scope) {
        if seen.insert(&node.id) {
            unique.push(node);
        } else {
            duplicates.push(node.id.clone());
        }
    }

    let by_id: HashMap<&NodeId, &Node<T>> = unique.iter().map(|&n| (&n.id, n)).collect();

    let heads: Vec<&Node<T>> = unique
        .iter()
        .copied()
        .filter(|n| n.previous.as_ref().map_or(true, |p| !by_id.contains_key(p)))
        .collect();

    let Some(head) = heads.first() else {
        let mut fallback = unique;
        fallback.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| a.id.cmp(&b.id))
        });
        return Materialized {
            order: fallback.into_iter().map(|n| n.id.clone()).collect(),
            duplicates,
            orphans: Vec::new(),
            head_candidates: 0,
            fallback: true,
        };
    };

    let mut order = Vec::with_capacity(unique.len());
    let mut visited = HashSet::with_capacity(unique.len());
    let mut cursor = Some(*head);

    while let Some(node) = cursor {
        if order.len() >= unique.len() || !visited.insert(&node.id) {
            break;
        }
        order.push(node.id.clone());
        cursor = node.next.as_ref().and_then(|n| by_id.get(n).copied());
    }

    let orphans: Vec<NodeId> = unique
        .iter()
        .filter(|n| !visited.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();
    order.extend(orphans.iter().cloned());

    Materialized {
        order,
        duplicates,
        orphans,
        head_candidates: heads.len(),
        fallback: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::model::Tier;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-03T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn node(id: &str, previous: Option<&str>, next: Option<&str>) -> Node<()> {
        Node::new(id, "s", Tier::Course, ()).with_links(previous, next)
    }

    fn ids(m: &Materialized) -> Vec<&str> {
        m.order.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn test_walks_pointers_regardless_of_input_order() {
        let nodes = vec![
            node("c", Some("b"), None),
            node("a", None, Some("b")),
            node("b", Some("a"), Some("c")),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["a", "b", "c"]);
        assert!(m.is_clean());
        assert_eq!(m.position(&NodeId::new("c")), Some(2));
    }

    #[test]
    fn test_empty_scope() {
        let m = materialize::<()>(&ScopeId::new("s"), &[]);
        assert!(m.order.is_empty());
        assert!(m.fallback);
    }

    #[test]
    fn test_filters_other_scopes() {
        let mut foreign = node("x", None, None);
        foreign.scope_id = ScopeId::new("other");
        let nodes = vec![node("a", None, None), foreign];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["a"]);
    }

    #[test]
    fn test_duplicates_collapse_to_first_occurrence() {
        let nodes = vec![
            node("a", None, Some("b")),
            node("b", Some("a"), None),
            node("a", None, None),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["a", "b"]);
        assert_eq!(m.duplicates, vec![NodeId::new("a")]);
        assert!(!m.is_clean());
    }

    #[test]
    fn test_unresolved_previous_counts_as_head() {
        let nodes = vec![
            node("b", Some("deleted"), Some("c")),
            node("c", Some("b"), None),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["b", "c"]);
        assert_eq!(m.head_candidates, 1);
    }

    #[test]
    fn test_multiple_heads_pick_first_and_append_rest() {
        let nodes = vec![
            node("a", None, Some("b")),
            node("b", Some("a"), None),
            node("x", None, None),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["a", "b", "x"]);
        assert_eq!(m.head_candidates, 2);
        assert_eq!(m.orphans, vec![NodeId::new("x")]);
    }

    #[test]
    fn test_cycle_behind_head_terminates() {
        // a -> b -> c -> b
        let nodes = vec![
            node("a", None, Some("b")),
            node("b", Some("a"), Some("c")),
            node("c", Some("b"), Some("b")),
            node("d", Some("c"), None),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert_eq!(ids(&m), vec!["a", "b", "c", "d"]);
        assert_eq!(m.orphans, vec![NodeId::new("d")]);
    }

    #[test]
    fn test_fully_cyclic_scope_falls_back_to_timestamps() {
        let t = base_time();
        let nodes = vec![
            node("b", Some("a"), Some("a")).with_created_at(t + Duration::seconds(2)),
            node("a", Some("b"), Some("b")).with_created_at(t + Duration::seconds(1)),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        assert!(m.fallback);
        assert_eq!(ids(&m), vec!["a", "b"]);
    }

    #[test]
    fn test_fallback_ties_break_on_order_then_id() {
        let t = base_time();
        let mut late = node("a", Some("z"), Some("z")).with_created_at(t);
        late.order = Some(2);
        let mut early = node("z", Some("a"), Some("a")).with_created_at(t);
        early.order = Some(1);
        let same = node("m", Some("a"), None).with_created_at(t);
        let m = materialize(&ScopeId::new("s"), &[late, early, same]);

        // `None` sorts before `Some`
        assert_eq!(ids(&m), vec!["m", "z", "a"]);
    }

    #[test]
    fn test_result_is_permutation_of_input_under_corruption() {
        let nodes = vec![
            node("a", Some("c"), Some("c")),
            node("b", None, Some("a")),
            node("c", Some("a"), Some("b")),
            node("d", Some("zz"), Some("a")),
            node("b", None, None),
        ];
        let m = materialize(&ScopeId::new("s"), &nodes);

        let mut sorted = ids(&m);
        sorted.sort_unstable();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }
}
