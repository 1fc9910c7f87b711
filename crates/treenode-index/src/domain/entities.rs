//! Core entities for the hierarchical index
//!
//! `Node` and `ClosureEdge` are the two logical tables persisted by the
//! record store. Everything else here is a request or result shape.

use super::value_objects::{Depth, NodeId, Priority, SortKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tree node as stored in the node table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier assigned by the store
    pub id: NodeId,
    /// Parent reference (None for roots)
    pub parent: Option<NodeId>,
    /// Left-to-right order among full siblings
    pub priority: Priority,
    /// Distance from the nearest root
    pub depth: Depth,
    /// Display name
    pub name: String,
    /// Free-form display and comparison fields
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Render one field for breadcrumbs and views.
    ///
    /// `id`, `name`, `priority` and `depth` are built in; anything else is
    /// looked up in `attributes`. Unknown keys render the id.
    pub fn display(&self, attr: &str) -> String {
        match attr {
            "id" => self.id.to_string(),
            "name" => self.name.clone(),
            "priority" => self.priority.to_string(),
            "depth" => self.depth.to_string(),
            key => self
                .attributes
                .get(key)
                .cloned()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }

    /// Value compared by sorted-sibling insertion.
    pub fn sort_value(&self, key: &SortKey) -> String {
        match key {
            SortKey::Name => self.name.clone(),
            SortKey::Attribute(attr) => self.attributes.get(attr).cloned().unwrap_or_default(),
        }
    }
}

/// Draft of a node that has not been created yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NewNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Materialize the draft with store-assigned identity and placement.
    pub fn into_node(
        self,
        id: NodeId,
        parent: Option<NodeId>,
        priority: Priority,
        depth: Depth,
    ) -> Node {
        Node {
            id,
            parent,
            priority,
            depth,
            name: self.name,
            attributes: self.attributes,
        }
    }

    /// Value compared by sorted-sibling insertion.
    pub fn sort_value(&self, key: &SortKey) -> String {
        match key {
            SortKey::Name => self.name.clone(),
            SortKey::Attribute(attr) => self.attributes.get(attr).cloned().unwrap_or_default(),
        }
    }
}

/// Partial update of the structural fields of a node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePatch {
    /// `Some(None)` makes the node a root.
    pub parent: Option<Option<NodeId>>,
    pub priority: Option<Priority>,
    pub depth: Option<Depth>,
}

impl NodePatch {
    pub fn parent(mut self, parent: Option<NodeId>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.priority.is_none() && self.depth.is_none()
    }

    pub fn apply(&self, node: &mut Node) {
        if let Some(parent) = self.parent {
            node.parent = parent;
        }
        if let Some(priority) = self.priority {
            node.priority = priority;
        }
        if let Some(depth) = self.depth {
            node.depth = depth;
        }
    }
}

/// One row of the closure table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClosureEdge {
    pub ancestor: NodeId,
    pub descendant: NodeId,
    pub depth_delta: Depth,
}

impl ClosureEdge {
    pub fn new(ancestor: NodeId, descendant: NodeId, depth_delta: Depth) -> Self {
        Self {
            ancestor,
            descendant,
            depth_delta,
        }
    }

    pub fn self_edge(id: NodeId) -> Self {
        Self::new(id, id, 0)
    }

    pub fn is_self(&self) -> bool {
        self.ancestor == self.descendant
    }

    pub fn key(&self) -> (NodeId, NodeId) {
        (self.ancestor, self.descendant)
    }
}

/// Outcome of a delete call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Nodes removed from the node table
    pub removed: Vec<NodeId>,
    /// Children reparented by a promote delete
    pub promoted: Vec<NodeId>,
    /// Closure rows removed
    pub edges_removed: usize,
}

/// Row shape returned by list and search views.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub text: String,
    pub level: Depth,
    pub is_leaf: bool,
}

/// Page of sorted search results around a selected node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub results: Vec<Node>,
    /// Node the next page should be requested relative to
    pub reference_id: Option<NodeId>,
}
