//! Inbound Ports (Driving Ports / API)
//!
//! What the index exposes to list views, admin actions and importers.

use crate::domain::entities::{DeleteReport, NewNode, Node, NodeView, SearchWindow};
use crate::domain::errors::TreeError;
use crate::domain::value_objects::{DeleteMode, NodeId, Position, WindowDirection};
use crate::domain::views::DisplayMode;

/// Primary hierarchical index API
pub trait TreeIndexApi: Send + Sync {
    // ---- mutations ----

    /// Create a node in the sibling group of `parent` (`None` for the root
    /// level) at `position`.
    fn insert(
        &self,
        draft: NewNode,
        parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node, TreeError>;

    /// Create a node next to `reference`.
    ///
    /// `position` is one of `first-sibling`, `left-sibling`,
    /// `right-sibling`, `last-sibling`, `sorted-sibling` or an integer
    /// priority; left/right are relative to `reference`.
    fn insert_sibling(
        &self,
        draft: NewNode,
        reference: NodeId,
        position: &str,
    ) -> Result<Node, TreeError>;

    /// Reparent `id` (with its subtree) under `new_parent` at `position`.
    ///
    /// Fails with `Cycle` when `new_parent` is `id` or one of its
    /// descendants.
    fn move_node(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node, TreeError>;

    fn delete(&self, id: NodeId, mode: DeleteMode) -> Result<DeleteReport, TreeError>;

    /// Spread the priorities of one sibling group to multiples of the
    /// configured spacing. Returns the number of rewritten siblings.
    fn renumber_children(&self, parent: Option<NodeId>) -> Result<usize, TreeError>;

    // ---- structural reads ----

    fn get_node(&self, id: NodeId) -> Result<Node, TreeError>;

    /// Children in priority order; `None` lists the roots.
    fn children_of(&self, parent: Option<NodeId>) -> Result<Vec<Node>, TreeError>;

    /// Proper ancestors, root first.
    fn ancestors_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError>;

    /// Proper descendants in tree order.
    fn descendants_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError>;

    /// Whether `ancestor` is a proper ancestor of `descendant`.
    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, TreeError>;

    fn sort_subset(&self, ids: &[NodeId]) -> Result<Vec<Node>, TreeError>;

    /// Labels from the root down to `id`, inclusive.
    fn breadcrumb_path(&self, id: NodeId, display_attr: &str) -> Result<Vec<String>, TreeError>;

    // ---- sibling navigation ----

    /// Full siblings of `id` in priority order, `id` excluded.
    fn siblings_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError>;

    fn first_sibling(&self, id: NodeId) -> Result<Node, TreeError>;

    fn last_sibling(&self, id: NodeId) -> Result<Node, TreeError>;

    fn previous_sibling(&self, id: NodeId) -> Result<Option<Node>, TreeError>;

    fn next_sibling(&self, id: NodeId) -> Result<Option<Node>, TreeError>;

    fn children_count(&self, id: NodeId) -> Result<usize, TreeError>;

    fn is_leaf(&self, id: NodeId) -> Result<bool, TreeError>;

    // ---- views ----

    fn search(&self, query: &str) -> Result<Vec<Node>, TreeError>;

    fn search_window(
        &self,
        query: &str,
        selected: Option<NodeId>,
        direction: WindowDirection,
        limit: usize,
    ) -> Result<SearchWindow, TreeError>;

    fn children_view(
        &self,
        parent: Option<NodeId>,
        mode: &DisplayMode,
    ) -> Result<Vec<NodeView>, TreeError>;

    // ---- maintenance ----

    /// Check the closure rows of the tree rooted at `root`.
    fn verify_integrity(&self, root: NodeId) -> Result<(), TreeError>;

    /// Recompute every closure row and depth from parent pointers.
    /// Returns the number of rows written.
    fn rebuild_index(&self) -> Result<usize, TreeError>;

    /// Invalidate every cached view.
    fn flush_cache(&self) -> Result<(), TreeError>;
}
