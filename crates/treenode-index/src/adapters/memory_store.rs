//! # In-Memory Record Store
//!
//! Reference `RecordStore` for tests and embedding.
//!
//! ## Transaction model
//!
//! - `begin` pins the committed tables (an `Arc`), so reads inside a
//!   transaction never see another transaction's partial work.
//! - Writes go to a private copy of the tables and are logged.
//! - `commit` replays the log onto the latest committed tables under the
//!   commit lock and swaps them in as a whole. Any failure leaves the
//!   committed tables untouched.
//!
//! Foreign keys are enforced per write (edges need both nodes, a node with
//! children or closure rows cannot be deleted). Sibling priority uniqueness
//! is a deferred constraint checked at commit.
//!
//! ## Fault injection
//!
//! `fail_next_commit`, `timeout_next_commit` and `fail_after_writes` let
//! tests force a rollback at a chosen point.

use crate::domain::entities::{ClosureEdge, NewNode, Node, NodePatch};
use crate::domain::errors::StoreError;
use crate::domain::value_objects::{Depth, NodeId, Priority};
use crate::ports::outbound::{EdgeFilter, NodeFilter, RecordStore, StoreTransaction};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// TABLES
// =============================================================================

#[derive(Clone, Debug, Default)]
struct Tables {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<(NodeId, NodeId), Depth>,
    by_parent: BTreeMap<Option<NodeId>, BTreeSet<NodeId>>,
    by_ancestor: HashMap<NodeId, BTreeSet<NodeId>>,
    by_descendant: HashMap<NodeId, BTreeSet<NodeId>>,
}

#[derive(Clone, Debug)]
enum WriteOp {
    CreateNode(Node),
    UpdateNode(NodeId, NodePatch),
    DeleteNode(NodeId),
    InsertEdges(Vec<ClosureEdge>),
    DeleteEdges(Vec<(NodeId, NodeId)>),
}

impl Tables {
    fn apply(&mut self, op: &WriteOp) -> Result<usize, StoreError> {
        match op {
            WriteOp::CreateNode(node) => self.create_node(node.clone()).map(|_| 1),
            WriteOp::UpdateNode(id, patch) => self.update_node(*id, patch).map(|_| 1),
            WriteOp::DeleteNode(id) => self.delete_node(*id).map(|_| 1),
            WriteOp::InsertEdges(edges) => self.insert_edges(edges).map(|_| edges.len()),
            WriteOp::DeleteEdges(pairs) => Ok(self.delete_edges(pairs)),
        }
    }

    fn create_node(&mut self, node: Node) -> Result<(), StoreError> {
        if self.nodes.contains_key(&node.id) {
            return Err(StoreError::Constraint(format!("duplicate node id {}", node.id)));
        }
        if let Some(parent) = node.parent {
            if !self.nodes.contains_key(&parent) {
                return Err(StoreError::NotFound(parent));
            }
        }
        self.by_parent.entry(node.parent).or_default().insert(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    fn update_node(&mut self, id: NodeId, patch: &NodePatch) -> Result<(), StoreError> {
        if let Some(Some(parent)) = patch.parent {
            if parent == id || !self.nodes.contains_key(&parent) {
                return Err(StoreError::Constraint(format!(
                    "node {} cannot take parent {}",
                    id, parent
                )));
            }
        }
        let node = self.nodes.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let old_parent = node.parent;
        patch.apply(node);
        let new_parent = node.parent;

        if old_parent != new_parent {
            if let Some(group) = self.by_parent.get_mut(&old_parent) {
                group.remove(&id);
            }
            self.by_parent.entry(new_parent).or_default().insert(id);
        }
        Ok(())
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError> {
        let node = self.nodes.get(&id).ok_or(StoreError::NotFound(id))?;
        let has_children = self
            .by_parent
            .get(&Some(id))
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        let has_edges = self.by_ancestor.get(&id).map(|s| !s.is_empty()).unwrap_or(false)
            || self.by_descendant.get(&id).map(|s| !s.is_empty()).unwrap_or(false);
        if has_children || has_edges {
            return Err(StoreError::Constraint(format!(
                "node {} is still referenced",
                id
            )));
        }

        let parent = node.parent;
        if let Some(group) = self.by_parent.get_mut(&parent) {
            group.remove(&id);
        }
        self.by_parent.remove(&Some(id));
        self.nodes.remove(&id);
        Ok(())
    }

    fn insert_edges(&mut self, edges: &[ClosureEdge]) -> Result<(), StoreError> {
        let mut batch = HashSet::with_capacity(edges.len());
        for edge in edges {
            for end in [edge.ancestor, edge.descendant] {
                if !self.nodes.contains_key(&end) {
                    return Err(StoreError::NotFound(end));
                }
            }
            if self.edges.contains_key(&edge.key()) || !batch.insert(edge.key()) {
                return Err(StoreError::Constraint(format!(
                    "duplicate closure row ({}, {})",
                    edge.ancestor, edge.descendant
                )));
            }
        }

        for edge in edges {
            self.edges.insert(edge.key(), edge.depth_delta);
            self.by_ancestor
                .entry(edge.ancestor)
                .or_default()
                .insert(edge.descendant);
            self.by_descendant
                .entry(edge.descendant)
                .or_default()
                .insert(edge.ancestor);
        }
        Ok(())
    }

    fn delete_edges(&mut self, pairs: &[(NodeId, NodeId)]) -> usize {
        let mut removed = 0;
        for (ancestor, descendant) in pairs {
            if self.edges.remove(&(*ancestor, *descendant)).is_some() {
                removed += 1;
                if let Some(set) = self.by_ancestor.get_mut(ancestor) {
                    set.remove(descendant);
                }
                if let Some(set) = self.by_descendant.get_mut(descendant) {
                    set.remove(ancestor);
                }
            }
        }
        removed
    }

    fn check_sibling_priorities(&self, touched: &HashSet<NodeId>) -> Result<(), StoreError> {
        let parents: BTreeSet<Option<NodeId>> = touched
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.parent)
            .collect();

        for parent in parents {
            let mut seen: HashSet<Priority> = HashSet::new();
            for id in self.by_parent.get(&parent).into_iter().flatten() {
                if let Some(node) = self.nodes.get(id) {
                    if !seen.insert(node.priority) {
                        return Err(StoreError::Constraint(format!(
                            "priority {} duplicated under {:?}",
                            node.priority, parent
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn edge(&self, ancestor: NodeId, descendant: NodeId) -> Option<ClosureEdge> {
        self.edges
            .get(&(ancestor, descendant))
            .map(|delta| ClosureEdge::new(ancestor, descendant, *delta))
    }

    fn below(&self, ancestor: NodeId) -> impl Iterator<Item = ClosureEdge> + '_ {
        self.by_ancestor
            .get(&ancestor)
            .into_iter()
            .flatten()
            .filter_map(move |d| self.edge(ancestor, *d))
    }

    fn above(&self, descendant: NodeId) -> impl Iterator<Item = ClosureEdge> + '_ {
        self.by_descendant
            .get(&descendant)
            .into_iter()
            .flatten()
            .filter_map(move |a| self.edge(*a, descendant))
    }

    fn filter_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        match filter {
            NodeFilter::All => self.nodes.values().cloned().collect(),
            NodeFilter::ParentIs(parent) => self
                .by_parent
                .get(parent)
                .into_iter()
                .flatten()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            NodeFilter::IdIn(ids) => ids
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            NodeFilter::NameContains(query) => {
                let query = query.to_lowercase();
                self.nodes
                    .values()
                    .filter(|n| n.name.to_lowercase().contains(&query))
                    .cloned()
                    .collect()
            }
        }
    }

    fn filter_edges(&self, filter: &EdgeFilter) -> Vec<ClosureEdge> {
        match filter {
            EdgeFilter::All => self
                .edges
                .iter()
                .map(|((a, d), delta)| ClosureEdge::new(*a, *d, *delta))
                .collect(),
            EdgeFilter::AncestorIs(id) => self.below(*id).collect(),
            EdgeFilter::DescendantIs(id) => self.above(*id).collect(),
            EdgeFilter::AncestorIn(ids) => ids
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .flat_map(|id| self.below(*id))
                .collect(),
            EdgeFilter::DescendantIn(ids) => ids
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .flat_map(|id| self.above(*id))
                .collect(),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// In-memory, snapshot-isolated record store.
pub struct InMemoryRecordStore {
    committed: RwLock<Arc<Tables>>,
    commit_lock: Mutex<()>,
    next_id: AtomicU64,
    commit_fault: Mutex<Option<StoreError>>,
    /// Writes left before an injected write failure
    write_budget: Mutex<Option<usize>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Tables::default())),
            commit_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            commit_fault: Mutex::new(None),
            write_budget: Mutex::new(None),
        }
    }

    /// Make the next commit fail with a backend error.
    pub fn fail_next_commit(&self) {
        *self.commit_fault.lock() = Some(StoreError::Backend("injected commit failure".into()));
    }

    /// Make the next commit fail with a transaction timeout.
    pub fn timeout_next_commit(&self) {
        *self.commit_fault.lock() = Some(StoreError::Timeout("injected commit timeout".into()));
    }

    /// Let `writes` more write calls succeed, then fail the next one.
    pub fn fail_after_writes(&self, writes: usize) {
        *self.write_budget.lock() = Some(writes);
    }

    /// Committed node count.
    pub fn node_count(&self) -> usize {
        self.committed.read().nodes.len()
    }

    /// Committed closure row count.
    pub fn edge_count(&self) -> usize {
        self.committed.read().edges.len()
    }

    /// Every committed node, by id.
    pub fn nodes(&self) -> Vec<Node> {
        self.committed.read().nodes.values().cloned().collect()
    }

    /// Every committed closure row, sorted.
    pub fn edges(&self) -> Vec<ClosureEdge> {
        self.committed.read().filter_edges(&EdgeFilter::All)
    }

    fn spend_write(&self) -> Result<(), StoreError> {
        let mut budget = self.write_budget.lock();
        match *budget {
            Some(0) => {
                *budget = None;
                Err(StoreError::Backend("injected write failure".into()))
            }
            Some(left) => {
                *budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let snapshot = self.committed.read().clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            view: snapshot,
            log: Vec::new(),
            touched: HashSet::new(),
        }))
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

struct MemoryTransaction<'a> {
    store: &'a InMemoryRecordStore,
    /// Pinned snapshot, copied on first write
    view: Arc<Tables>,
    log: Vec<WriteOp>,
    /// Nodes whose sibling group must be re-checked at commit
    touched: HashSet<NodeId>,
}

impl MemoryTransaction<'_> {
    fn write(&mut self, op: WriteOp) -> Result<usize, StoreError> {
        self.store.spend_write()?;
        let affected = Arc::make_mut(&mut self.view).apply(&op)?;
        self.log.push(op);
        Ok(affected)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.view.nodes.get(&id).cloned())
    }

    fn filter_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError> {
        Ok(self.view.filter_nodes(filter))
    }

    fn create_node(
        &mut self,
        draft: NewNode,
        parent: Option<NodeId>,
        priority: Priority,
        depth: Depth,
    ) -> Result<NodeId, StoreError> {
        let id = self.store.next_id.fetch_add(1, Ordering::Relaxed);
        self.write(WriteOp::CreateNode(draft.into_node(id, parent, priority, depth)))?;
        self.touched.insert(id);
        Ok(id)
    }

    fn update_node(&mut self, id: NodeId, patch: &NodePatch) -> Result<(), StoreError> {
        self.write(WriteOp::UpdateNode(id, patch.clone()))?;
        if patch.parent.is_some() || patch.priority.is_some() {
            self.touched.insert(id);
        }
        Ok(())
    }

    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError> {
        self.write(WriteOp::DeleteNode(id)).map(|_| ())
    }

    fn filter_edges(&self, filter: &EdgeFilter) -> Result<Vec<ClosureEdge>, StoreError> {
        Ok(self.view.filter_edges(filter))
    }

    fn insert_edges(&mut self, edges: Vec<ClosureEdge>) -> Result<(), StoreError> {
        if edges.is_empty() {
            return Ok(());
        }
        self.write(WriteOp::InsertEdges(edges)).map(|_| ())
    }

    fn delete_edges(&mut self, pairs: &[(NodeId, NodeId)]) -> Result<usize, StoreError> {
        if pairs.is_empty() {
            return Ok(0);
        }
        self.write(WriteOp::DeleteEdges(pairs.to_vec()))
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(err) = self.store.commit_fault.lock().take() {
            return Err(err);
        }
        if self.log.is_empty() {
            return Ok(());
        }

        let _serial = self.store.commit_lock.lock();
        let base = self.store.committed.read().clone();
        let mut next = (*base).clone();
        for op in &self.log {
            next.apply(op)?;
        }
        next.check_sibling_priorities(&self.touched)?;

        *self.store.committed.write() = Arc::new(next);
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}
