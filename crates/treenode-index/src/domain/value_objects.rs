//! Value objects for the hierarchical index
//!
//! Identifiers, positions, scopes and the other small immutable types that
//! flow between the algorithms, the cache and the service.

use super::errors::TreeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type aliases for clarity
pub type NodeId = u64;
pub type Priority = i64;
pub type Depth = u32;
pub type Generation = u64;

/// Partition used for cache generations and mutation locks.
///
/// `Forest` covers the root-level sibling group and every view that may span
/// more than one tree (subset sorts, searches). `Tree` covers everything
/// below one root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TreeScope {
    Forest,
    Tree(NodeId),
}

impl TreeScope {
    /// Stable textual tag, used inside cache fingerprints.
    pub fn tag(&self) -> String {
        match self {
            TreeScope::Forest => "forest".to_string(),
            TreeScope::Tree(root) => format!("tree:{}", root),
        }
    }
}

impl fmt::Display for TreeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Symbolic placement of a node among its siblings.
///
/// `LeftSibling` / `RightSibling` carry the reference node they are
/// relative to; the other variants are relative to the target sibling group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    FirstSibling,
    LeftSibling(NodeId),
    RightSibling(NodeId),
    LastSibling,
    SortedSibling,
    Priority(Priority),
}

impl Position {
    /// Parse the textual position names accepted by `add_sibling`-style
    /// calls, relative to `reference`.
    ///
    /// Accepts `first-sibling`, `left-sibling`, `right-sibling`,
    /// `last-sibling`, `sorted-sibling` or a plain integer priority.
    pub fn parse(spec: &str, reference: NodeId) -> Result<Self, TreeError> {
        let spec = spec.trim();
        match spec {
            "first-sibling" => Ok(Position::FirstSibling),
            "left-sibling" => Ok(Position::LeftSibling(reference)),
            "right-sibling" => Ok(Position::RightSibling(reference)),
            "last-sibling" => Ok(Position::LastSibling),
            "sorted-sibling" => Ok(Position::SortedSibling),
            other => other
                .parse::<Priority>()
                .map(Position::Priority)
                .map_err(|_| TreeError::InvalidPosition(format!("unknown position: {}", other))),
        }
    }
}

/// Concrete result of resolving a [`Position`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub parent: Option<NodeId>,
    pub priority: Priority,
}

impl Placement {
    pub fn new(parent: Option<NodeId>, priority: Priority) -> Self {
        Self { parent, priority }
    }
}

/// What happens to the descendants of a deleted node.
///
/// There is no default: every delete call names its mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Remove the node and its whole subtree.
    Cascade,
    /// Reparent the direct children to the deleted node's parent.
    Promote,
}

impl FromStr for DeleteMode {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cascade" => Ok(DeleteMode::Cascade),
            "promote" => Ok(DeleteMode::Promote),
            other => Err(TreeError::InvalidArgument(format!(
                "unknown delete mode: {}",
                other
            ))),
        }
    }
}

/// Field used to keep siblings sorted for [`Position::SortedSibling`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    Name,
    Attribute(String),
}

/// Direction of a search result window, relative to the selected node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowDirection {
    /// Nodes before the selected one.
    Up,
    /// Nodes after the selected one.
    Down,
    /// Nodes on both sides, selected included.
    #[default]
    Center,
}

impl FromStr for WindowDirection {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(WindowDirection::Up),
            "down" => Ok(WindowDirection::Down),
            "center" => Ok(WindowDirection::Center),
            other => Err(TreeError::InvalidArgument(format!(
                "unknown direction: {}",
                other
            ))),
        }
    }
}
