//! Tree-order sort of arbitrary node subsets
//!
//! Every node gets its materialized ordinal path (the priorities from its
//! root down to itself). Sorting by that path segment-wise reproduces a
//! depth-first, priority-ascending traversal: a prefix sorts before its
//! extensions, and siblings compare by their own segment.

use crate::domain::entities::{ClosureEdge, Node};
use crate::domain::errors::TreeError;
use crate::domain::value_objects::{NodeId, Priority, TreeScope};
use std::collections::HashMap;

/// Width of one base-36 segment; 36^13 > 2^64.
pub const SEGMENT_WIDTH: usize = 13;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Priorities from a root down to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrdinalPath(pub Vec<Priority>);

impl OrdinalPath {
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Order-preserving string form: fixed-width base-36 segments joined by
    /// `/`. Byte order of two encodings equals the order of the paths.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|p| encode_segment(*p))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Encode one priority as a zero-padded base-36 string, offset into
/// unsigned space so negative values sort first.
pub fn encode_segment(priority: Priority) -> String {
    let mut value = (priority as i128 - i64::MIN as i128) as u64;
    let mut digits = [b'0'; SEGMENT_WIDTH];
    for slot in digits.iter_mut().rev() {
        *slot = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }
    digits.iter().map(|d| *d as char).collect()
}

/// Build the ordinal path of `node` from its ancestor rows (self row
/// included) and the priorities of those ancestors.
pub fn ordinal_path(
    node: &Node,
    ancestor_rows: &[ClosureEdge],
    priorities: &HashMap<NodeId, Priority>,
) -> Result<OrdinalPath, TreeError> {
    let mut rows: Vec<&ClosureEdge> = ancestor_rows
        .iter()
        .filter(|e| e.descendant == node.id)
        .collect();

    if rows.len() != node.depth as usize + 1 {
        return Err(TreeError::Integrity {
            scope: TreeScope::Forest,
            expected: node.depth as usize + 1,
            actual: rows.len(),
        });
    }

    // root first
    rows.sort_by(|a, b| b.depth_delta.cmp(&a.depth_delta));

    rows.iter()
        .map(|e| {
            if e.is_self() {
                Ok(node.priority)
            } else {
                priorities
                    .get(&e.ancestor)
                    .copied()
                    .ok_or(TreeError::NotFound(e.ancestor))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(OrdinalPath)
}

/// Sort `nodes` into tree order.
///
/// `ancestor_rows` must hold the ancestor rows of every input node;
/// `priorities` the priority of every proper ancestor. Ties, which only
/// corrupt data can produce, fall back to node id.
pub fn tree_order(
    nodes: Vec<Node>,
    ancestor_rows: &[ClosureEdge],
    priorities: &HashMap<NodeId, Priority>,
) -> Result<Vec<Node>, TreeError> {
    let mut rows_by_node: HashMap<NodeId, Vec<ClosureEdge>> = HashMap::new();
    for row in ancestor_rows {
        rows_by_node.entry(row.descendant).or_default().push(*row);
    }

    let mut keyed = nodes
        .into_iter()
        .map(|node| {
            let rows = rows_by_node.get(&node.id).map(Vec::as_slice).unwrap_or(&[]);
            ordinal_path(&node, rows, priorities).map(|path| (path, node))
        })
        .collect::<Result<Vec<_>, _>>()?;

    keyed.sort_by(|(pa, a), (pb, b)| pa.cmp(pb).then(a.id.cmp(&b.id)));
    Ok(keyed.into_iter().map(|(_, node)| node).collect())
}
