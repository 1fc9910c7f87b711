//! Domain invariants for the hierarchical index
//!
//! Pure checks over node and edge sets. The service runs them inside
//! integrity verification; tests run them after every mutation.

use super::entities::{ClosureEdge, Node};
use super::value_objects::NodeId;
use std::collections::{HashMap, HashSet};

/// Expected closure row count for a set of nodes: one row per
/// (ancestor, self-or-descendant) pair, i.e. Σ (depth + 1).
pub fn expected_edge_count(nodes: &[Node]) -> usize {
    nodes.iter().map(|n| n.depth as usize + 1).sum()
}

/// Closure completeness.
/// The edge set is exactly the transitive closure of the parent relation
/// restricted to `nodes`, with correct deltas.
pub fn invariant_closure_exact(nodes: &[Node], edges: &[ClosureEdge]) -> bool {
    let by_id: HashMap<NodeId, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut expected: HashSet<ClosureEdge> = HashSet::new();

    for node in nodes {
        let mut current = Some(node.id);
        let mut delta = 0;
        while let Some(id) = current {
            expected.insert(ClosureEdge::new(id, node.id, delta));
            current = by_id.get(&id).and_then(|n| n.parent);
            delta += 1;
            if delta as usize > nodes.len() {
                // parent pointers loop
                return false;
            }
        }
    }

    let actual: HashSet<ClosureEdge> = edges.iter().copied().collect();
    actual.len() == edges.len() && actual == expected
}

/// Priority uniqueness.
/// No two full siblings share a priority.
pub fn invariant_unique_priorities(nodes: &[Node]) -> bool {
    let mut seen: HashSet<(Option<NodeId>, i64)> = HashSet::new();
    nodes.iter().all(|n| seen.insert((n.parent, n.priority)))
}

/// Depth correctness.
/// depth(root) = 0 and depth(child) = depth(parent) + 1.
pub fn invariant_depths(nodes: &[Node]) -> bool {
    let by_id: HashMap<NodeId, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
    nodes.iter().all(|n| match n.parent {
        None => n.depth == 0,
        Some(parent) => by_id
            .get(&parent)
            .map(|p| p.depth + 1 == n.depth)
            .unwrap_or(false),
    })
}

/// Ancestor chain shape.
/// The ancestor rows of one node have deltas exactly `0..=depth`, once each.
pub fn invariant_ancestor_chain(node: &Node, ancestors: &[ClosureEdge]) -> bool {
    if ancestors.len() != node.depth as usize + 1 {
        return false;
    }
    let mut deltas: Vec<u32> = ancestors
        .iter()
        .filter(|e| e.descendant == node.id)
        .map(|e| e.depth_delta)
        .collect();
    deltas.sort_unstable();
    deltas.iter().copied().eq(0..=node.depth)
}
