//! Closure table maintenance
//!
//! Pure edge arithmetic. The service reads the rows these functions need,
//! calls them, and writes the result inside one store transaction.
//!
//! Moving a subtree rooted at `n` under a new parent `p`:
//!
//! ```text
//! delete: (a, d)  for d in subtree(n), a not in subtree(n)
//! insert: (a, d, delta(a→p) + 1 + delta(n→d))  for a in ancestors*(p), d in subtree*(n)
//! ```

use crate::domain::entities::{ClosureEdge, Node};
use crate::domain::errors::TreeError;
use crate::domain::value_objects::{Depth, NodeId, TreeScope};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Rows for a node created under `parent_ancestors` (the ancestor rows of
/// its parent, self row included). Empty input means a new root.
pub fn edges_for_new_node(id: NodeId, parent_ancestors: &[ClosureEdge]) -> Vec<ClosureEdge> {
    let mut edges = Vec::with_capacity(parent_ancestors.len() + 1);
    edges.push(ClosureEdge::self_edge(id));
    edges.extend(
        parent_ancestors
            .iter()
            .map(|e| ClosureEdge::new(e.ancestor, id, e.depth_delta + 1)),
    );
    edges
}

/// Rows linking a subtree to the ancestors of its old position.
///
/// `subtree_ancestors` are all rows whose descendant lies in the subtree.
pub fn detached_edges(
    subtree_ids: &HashSet<NodeId>,
    subtree_ancestors: &[ClosureEdge],
) -> Vec<(NodeId, NodeId)> {
    subtree_ancestors
        .iter()
        .filter(|e| subtree_ids.contains(&e.descendant) && !subtree_ids.contains(&e.ancestor))
        .map(ClosureEdge::key)
        .collect()
}

/// Cross product of the new parent's ancestors (self row included) with
/// the subtree rows (rows whose ancestor is the subtree root).
pub fn reattached_edges(
    subtree: &[ClosureEdge],
    new_parent_ancestors: &[ClosureEdge],
) -> Vec<ClosureEdge> {
    let mut edges = Vec::with_capacity(subtree.len() * new_parent_ancestors.len());
    for above in new_parent_ancestors {
        for below in subtree {
            edges.push(ClosureEdge::new(
                above.ancestor,
                below.descendant,
                above.depth_delta + 1 + below.depth_delta,
            ));
        }
    }
    edges
}

/// Cached depths for every subtree node once the subtree root sits at
/// `root_depth`.
pub fn subtree_depths(subtree: &[ClosureEdge], root_depth: Depth) -> Vec<(NodeId, Depth)> {
    subtree
        .iter()
        .map(|e| (e.descendant, root_depth + e.depth_delta))
        .collect()
}

/// Recomputed closure for a whole forest.
#[derive(Debug, Default)]
pub struct FullClosure {
    pub edges: Vec<ClosureEdge>,
    pub depths: HashMap<NodeId, Depth>,
}

/// Rebuild every row and depth from parent pointers alone.
///
/// Nodes not reachable from a root (dangling parents or parent loops) make
/// the rebuild fail with an integrity error instead of producing a partial
/// index.
pub fn full_closure(nodes: &[Node]) -> Result<FullClosure, TreeError> {
    let mut children: BTreeMap<Option<NodeId>, Vec<NodeId>> = BTreeMap::new();
    for node in nodes {
        children.entry(node.parent).or_default().push(node.id);
    }

    let mut result = FullClosure::default();
    let mut stack: Vec<(NodeId, Vec<NodeId>)> = children
        .get(&None)
        .map(|roots| roots.iter().map(|id| (*id, Vec::new())).collect())
        .unwrap_or_default();

    while let Some((id, path)) = stack.pop() {
        let depth = path.len() as Depth;
        result.depths.insert(id, depth);
        result.edges.push(ClosureEdge::self_edge(id));
        for (i, ancestor) in path.iter().enumerate() {
            result
                .edges
                .push(ClosureEdge::new(*ancestor, id, depth - i as Depth));
        }

        if let Some(kids) = children.get(&Some(id)) {
            for kid in kids {
                let mut kid_path = path.clone();
                kid_path.push(id);
                stack.push((*kid, kid_path));
            }
        }
    }

    if result.depths.len() != nodes.len() {
        return Err(TreeError::Integrity {
            scope: TreeScope::Forest,
            expected: nodes.len(),
            actual: result.depths.len(),
        });
    }

    Ok(result)
}
