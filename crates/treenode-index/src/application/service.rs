//! Hierarchical Index Service
//!
//! Main service implementing TreeIndexApi.
//!
//! ## Mutation path
//!
//! 1. Work out the scopes the mutation touches from a snapshot
//! 2. Claim those scopes, then re-read them inside the lock (retry on change)
//! 3. Rewrite nodes, sibling priorities and closure rows in one transaction
//! 4. Commit, then bump the generation of every touched scope and `Forest`
//!
//! Any error before the commit rolls the transaction back and bumps nothing.
//!
//! ## Read path
//!
//! Reads never lock. Cached views go through [`InvalidatingCache`], which
//! observes the scope generation before computing from a fresh snapshot.

use crate::adapters::{InMemoryRecordStore, LruCacheBackend};
use crate::algorithms::closure::{
    detached_edges, edges_for_new_node, full_closure, reattached_edges, subtree_depths,
};
use crate::algorithms::ordering::{
    priorities_unique, sorted_anchor, Anchor, PriorityPlan, SiblingOrdering, SiblingSlot,
};
use crate::algorithms::tree_sort::tree_order;
use crate::application::scope_locks::{ScopeGuard, ScopeLocks};
use crate::cache::{generate_key, InvalidatingCache};
use crate::config::{ConfigError, TreeIndexConfig};
use crate::domain::entities::{
    ClosureEdge, DeleteReport, NewNode, Node, NodePatch, NodeView, SearchWindow,
};
use crate::domain::errors::TreeError;
use crate::domain::invariants::{
    expected_edge_count, invariant_ancestor_chain, invariant_closure_exact, invariant_depths,
    invariant_unique_priorities,
};
use crate::domain::value_objects::{
    DeleteMode, Depth, NodeId, Placement, Position, Priority, TreeScope, WindowDirection,
};
use crate::domain::views::DisplayMode;
use crate::metrics::IndexMetrics;
use crate::ports::inbound::TreeIndexApi;
use crate::ports::outbound::{CacheBackend, EdgeFilter, NodeFilter, RecordStore, StoreTransaction};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type Scopes = BTreeSet<TreeScope>;

/// Hierarchical Index Service
///
/// Owns its cache and lock table; share it across threads with `Arc`.
pub struct TreeIndexService<S: RecordStore, C: CacheBackend> {
    store: S,
    cache: InvalidatingCache<C>,
    locks: ScopeLocks,
    ordering: SiblingOrdering,
    config: TreeIndexConfig,
    metrics: Arc<IndexMetrics>,
}

impl TreeIndexService<InMemoryRecordStore, LruCacheBackend> {
    /// Service over an empty in-memory store and an LRU cache sized from
    /// `config`.
    pub fn in_memory(config: TreeIndexConfig) -> Result<Self, ConfigError> {
        let backend = LruCacheBackend::new(config.cache_capacity);
        Self::new(InMemoryRecordStore::new(), backend, config)
    }
}

impl<S: RecordStore, C: CacheBackend> TreeIndexService<S, C> {
    pub fn new(store: S, backend: C, config: TreeIndexConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let metrics = Arc::new(IndexMetrics::new());
        Ok(Self {
            store,
            cache: InvalidatingCache::new(backend, config.cache_ttl(), Arc::clone(&metrics)),
            locks: ScopeLocks::new(),
            ordering: SiblingOrdering::new(config.priority_spacing),
            config,
            metrics,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &InvalidatingCache<C> {
        &self.cache
    }

    pub fn config(&self) -> &TreeIndexConfig {
        &self.config
    }

    pub fn metrics(&self) -> &IndexMetrics {
        &self.metrics
    }

    // =========================================================================
    // MUTATION PLUMBING
    // =========================================================================

    /// Run `body` inside one transaction holding the scopes named by `plan`.
    ///
    /// `body` returns its result plus scopes that only exist after the
    /// mutation (new roots); those are bumped together with the locked ones.
    fn mutate<T>(
        &self,
        op: &'static str,
        plan: impl Fn(&dyn StoreTransaction) -> Result<Scopes, TreeError>,
        body: impl FnOnce(&mut dyn StoreTransaction) -> Result<(T, Scopes), TreeError>,
    ) -> Result<T, TreeError> {
        let (guard, mut txn) = self.lock_scopes(op, &plan)?;

        let (value, created) = match body(&mut *txn) {
            Ok(done) => done,
            Err(e) => {
                txn.rollback();
                self.metrics.record_rollback();
                if matches!(e, TreeError::Integrity { .. }) {
                    error!(op, error = %e, "mutation aborted on integrity violation");
                } else {
                    warn!(op, error = %e, "mutation rolled back");
                }
                return Err(e);
            }
        };

        if let Err(e) = txn.commit() {
            self.metrics.record_rollback();
            warn!(op, error = %e, "commit failed, mutation rolled back");
            return Err(e.into());
        }

        let mut bumped: Scopes = guard.scopes().clone();
        bumped.extend(created);
        bumped.insert(TreeScope::Forest);
        self.cache.bump_all(&bumped);
        drop(guard);

        self.metrics.record_mutation();
        debug!(op, scopes = ?bumped, "generations bumped");
        Ok(value)
    }

    /// Claim the scopes named by `plan` and open the transaction that will
    /// run under them. The scope set is re-read inside the lock; if it moved
    /// in between, the claim is released and retried.
    fn lock_scopes(
        &self,
        op: &'static str,
        plan: &impl Fn(&dyn StoreTransaction) -> Result<Scopes, TreeError>,
    ) -> Result<(ScopeGuard<'_>, Box<dyn StoreTransaction + '_>), TreeError> {
        let timeout = self.config.lock_timeout();

        for attempt in 0..=self.config.lock_retries {
            let wanted = {
                let txn = self.store.begin()?;
                let scopes = plan(&*txn);
                txn.rollback();
                scopes?
            };

            let Some(guard) = self.locks.acquire(&wanted, timeout) else {
                self.metrics.record_lock_retry();
                warn!(op, attempt, scopes = ?wanted, "scope lock timed out");
                continue;
            };

            let txn = self.store.begin()?;
            if plan(&*txn)? == wanted {
                return Ok((guard, txn));
            }

            txn.rollback();
            self.metrics.record_lock_retry();
            debug!(op, attempt, "scope set changed while locking, retrying");
        }

        Err(TreeError::Retryable(format!(
            "{}: scope locks not acquired after {} attempts",
            op,
            self.config.lock_retries + 1
        )))
    }

    // =========================================================================
    // SHARED READS
    // =========================================================================

    fn integrity_failure(&self, err: TreeError) -> TreeError {
        if let TreeError::Integrity {
            scope,
            expected,
            actual,
        } = &err
        {
            self.metrics.record_integrity_failure();
            error!(%scope, expected, actual, "closure index integrity violation");
        }
        err
    }

    fn require_node(&self, txn: &dyn StoreTransaction, id: NodeId) -> Result<Node, TreeError> {
        txn.get_node(id)?.ok_or(TreeError::NotFound(id))
    }

    /// Ancestor rows of `node`, self row included. With `check`, a chain
    /// that does not have exactly the deltas `0..=depth` is an integrity
    /// error.
    fn ancestor_rows(
        &self,
        txn: &dyn StoreTransaction,
        node: &Node,
        check: bool,
    ) -> Result<Vec<ClosureEdge>, TreeError> {
        let rows = txn.filter_edges(&EdgeFilter::DescendantIs(node.id))?;
        if check && !invariant_ancestor_chain(node, &rows) {
            return Err(self.integrity_failure(TreeError::Integrity {
                scope: TreeScope::Tree(root_of(node, &rows)),
                expected: node.depth as usize + 1,
                actual: rows.len(),
            }));
        }
        Ok(rows)
    }

    /// Scope owning the sibling group under `parent`.
    fn group_scope(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<NodeId>,
    ) -> Result<TreeScope, TreeError> {
        match parent {
            None => Ok(TreeScope::Forest),
            Some(id) => self.node_scope(txn, id),
        }
    }

    /// Scope of the tree containing `id`.
    fn node_scope(&self, txn: &dyn StoreTransaction, id: NodeId) -> Result<TreeScope, TreeError> {
        let node = self.require_node(txn, id)?;
        let rows = self.ancestor_rows(txn, &node, true)?;
        Ok(TreeScope::Tree(root_of(&node, &rows)))
    }

    /// Cache scope of a read keyed on `id`, from its own snapshot.
    fn read_scope(&self, id: NodeId) -> Result<TreeScope, TreeError> {
        let txn = self.store.begin()?;
        let node = self.require_node(&*txn, id)?;
        let rows = self.ancestor_rows(&*txn, &node, self.config.integrity_check_on_read)?;
        Ok(TreeScope::Tree(root_of(&node, &rows)))
    }

    /// Children of `parent` in priority order.
    fn sibling_group(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<NodeId>,
    ) -> Result<Vec<Node>, TreeError> {
        let mut group = txn.filter_nodes(&NodeFilter::ParentIs(parent))?;
        group.sort_by_key(|n| (n.priority, n.id));
        Ok(group)
    }

    /// Sort `nodes` into tree order with two batched reads: their ancestor
    /// rows and the ancestors' priorities.
    fn sort_nodes(
        &self,
        txn: &dyn StoreTransaction,
        nodes: Vec<Node>,
    ) -> Result<Vec<Node>, TreeError> {
        if nodes.is_empty() {
            return Ok(nodes);
        }
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let rows = txn.filter_edges(&EdgeFilter::DescendantIn(ids))?;

        let mut priorities: HashMap<NodeId, Priority> =
            nodes.iter().map(|n| (n.id, n.priority)).collect();
        let missing: BTreeSet<NodeId> = rows
            .iter()
            .map(|e| e.ancestor)
            .filter(|id| !priorities.contains_key(id))
            .collect();
        if !missing.is_empty() {
            for ancestor in txn.filter_nodes(&NodeFilter::IdIn(missing.into_iter().collect()))? {
                priorities.insert(ancestor.id, ancestor.priority);
            }
        }

        tree_order(nodes, &rows, &priorities).map_err(|e| self.integrity_failure(e))
    }

    /// Whether `ancestor` is a proper ancestor of `descendant`.
    fn is_ancestor_in(
        &self,
        txn: &dyn StoreTransaction,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<bool, TreeError> {
        Ok(txn
            .filter_edges(&EdgeFilter::DescendantIs(descendant))?
            .iter()
            .any(|e| e.ancestor == ancestor && !e.is_self()))
    }

    fn load_ancestors(&self, txn: &dyn StoreTransaction, node: &Node) -> Result<Vec<Node>, TreeError> {
        let rows = self.ancestor_rows(txn, node, self.config.integrity_check_on_read)?;
        let ids: Vec<NodeId> = rows
            .iter()
            .filter(|e| !e.is_self())
            .map(|e| e.ancestor)
            .collect();
        let mut ancestors = txn.filter_nodes(&NodeFilter::IdIn(ids))?;
        ancestors.sort_by_key(|n| n.depth);
        Ok(ancestors)
    }

    // =========================================================================
    // SIBLING ORDERING
    // =========================================================================

    /// Resolve `position` in the group under `parent`, returning the
    /// placement and the sibling rewrites it needs. `moving` is excluded
    /// from the group; `sort_value` is compared by sorted placement.
    fn resolve_position(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<NodeId>,
        position: Position,
        moving: Option<NodeId>,
        sort_value: &str,
    ) -> Result<(Placement, PriorityPlan), TreeError> {
        let siblings: Vec<Node> = self
            .sibling_group(txn, parent)?
            .into_iter()
            .filter(|n| Some(n.id) != moving)
            .collect();

        let anchor = match position {
            Position::FirstSibling => Anchor::First,
            Position::LastSibling => Anchor::Last,
            Position::LeftSibling(reference) => {
                Anchor::Before(self.reference_index(txn, &siblings, parent, reference, moving)?)
            }
            Position::RightSibling(reference) => {
                Anchor::After(self.reference_index(txn, &siblings, parent, reference, moving)?)
            }
            Position::SortedSibling => {
                let key = &self.config.sort_key;
                sorted_anchor(siblings.len(), |i| {
                    siblings[i].sort_value(key).as_str() <= sort_value
                })
            }
            Position::Priority(priority) => Anchor::Exact(priority),
        };

        let slots: Vec<SiblingSlot> = siblings
            .iter()
            .map(|n| SiblingSlot::new(n.id, n.priority))
            .collect();
        let plan = self.ordering.resolve(parent, &slots, anchor)?;
        Ok((Placement::new(parent, plan.priority), plan))
    }

    fn reference_index(
        &self,
        txn: &dyn StoreTransaction,
        siblings: &[Node],
        parent: Option<NodeId>,
        reference: NodeId,
        moving: Option<NodeId>,
    ) -> Result<usize, TreeError> {
        if let Some(index) = siblings.iter().position(|n| n.id == reference) {
            return Ok(index);
        }
        if moving == Some(reference) {
            return Err(TreeError::InvalidPosition(format!(
                "node {} cannot be placed relative to itself",
                reference
            )));
        }
        match txn.get_node(reference)? {
            None => Err(TreeError::NotFound(reference)),
            Some(_) => Err(TreeError::InvalidPosition(format!(
                "node {} is not a child of {:?}",
                reference, parent
            ))),
        }
    }

    /// Write sibling priority rewrites. Failures while renumbering surface
    /// as `Renumber` unless the store asks for a retry.
    fn apply_priorities(
        &self,
        txn: &mut dyn StoreTransaction,
        parent: Option<NodeId>,
        updates: &[(NodeId, Priority)],
        renumbered: bool,
    ) -> Result<(), TreeError> {
        for (id, priority) in updates {
            if let Err(e) = txn.update_node(*id, &NodePatch::default().priority(*priority)) {
                let err = TreeError::from(e);
                return Err(if renumbered && !err.is_retryable() {
                    TreeError::Renumber {
                        parent,
                        reason: err.to_string(),
                    }
                } else {
                    err
                });
            }
        }
        if renumbered {
            self.metrics.record_renumber();
            debug!(?parent, rewritten = updates.len(), "sibling group renumbered");
        }
        Ok(())
    }

    /// Final uniqueness check of one sibling group before commit.
    fn check_sibling_group(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<NodeId>,
        placed: Priority,
    ) -> Result<(), TreeError> {
        let slots: Vec<SiblingSlot> = txn
            .filter_nodes(&NodeFilter::ParentIs(parent))?
            .iter()
            .map(|n| SiblingSlot::new(n.id, n.priority))
            .collect();
        if priorities_unique(&slots) {
            Ok(())
        } else {
            Err(TreeError::PriorityConflict {
                parent,
                priority: placed,
            })
        }
    }

    /// Priority rewrites that spread the group under `parent` to multiples
    /// of the spacing; empty when it is already spread.
    fn renumber_updates(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<NodeId>,
    ) -> Result<Vec<(NodeId, Priority)>, TreeError> {
        let slots: Vec<SiblingSlot> = self
            .sibling_group(txn, parent)?
            .iter()
            .map(|n| SiblingSlot::new(n.id, n.priority))
            .collect();
        let spread = self.ordering.renumber(parent, &slots)?;
        Ok(spread
            .iter()
            .zip(&slots)
            .filter(|(new, old)| new.priority != old.priority)
            .map(|(new, _)| (new.id, new.priority))
            .collect())
    }

    // =========================================================================
    // CLOSURE MAINTENANCE
    // =========================================================================

    /// Rewrite the closure rows and cached depths of the subtree rooted at
    /// `node` for its new parent (`new_parent_rows` are that parent's
    /// ancestor rows, empty for the root level). Returns the number of
    /// rows removed.
    fn rebuild_edges_for(
        &self,
        txn: &mut dyn StoreTransaction,
        node: &Node,
        new_parent_rows: &[ClosureEdge],
        new_depth: Depth,
    ) -> Result<usize, TreeError> {
        let subtree = txn.filter_edges(&EdgeFilter::AncestorIs(node.id))?;
        let subtree_ids: HashSet<NodeId> = subtree.iter().map(|e| e.descendant).collect();
        let above = txn.filter_edges(&EdgeFilter::DescendantIn(
            subtree_ids.iter().copied().collect(),
        ))?;

        let removed = txn.delete_edges(&detached_edges(&subtree_ids, &above))?;
        txn.insert_edges(reattached_edges(&subtree, new_parent_rows))?;

        if new_depth != node.depth {
            for (id, depth) in subtree_depths(&subtree, new_depth) {
                txn.update_node(id, &NodePatch::default().depth(depth))?;
            }
        }
        Ok(removed)
    }

    fn parent_rows(
        &self,
        txn: &dyn StoreTransaction,
        parent: Option<&Node>,
    ) -> Result<Vec<ClosureEdge>, TreeError> {
        match parent {
            Some(node) => self.ancestor_rows(txn, node, true),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    fn delete_cascade(
        &self,
        txn: &mut dyn StoreTransaction,
        node: &Node,
    ) -> Result<(DeleteReport, Scopes), TreeError> {
        let mut subtree = txn.filter_edges(&EdgeFilter::AncestorIs(node.id))?;
        subtree.sort_by_key(|e| (e.depth_delta, e.descendant));
        let ids: Vec<NodeId> = subtree.iter().map(|e| e.descendant).collect();

        let rows: Vec<(NodeId, NodeId)> = txn
            .filter_edges(&EdgeFilter::DescendantIn(ids.clone()))?
            .iter()
            .map(ClosureEdge::key)
            .collect();
        let edges_removed = txn.delete_edges(&rows)?;

        // leaves first
        for id in ids.iter().rev() {
            txn.delete_node(*id)?;
        }

        Ok((
            DeleteReport {
                removed: ids,
                promoted: Vec::new(),
                edges_removed,
            },
            Scopes::new(),
        ))
    }

    /// Reparent the children of `node` into its own slot, then remove it.
    fn delete_promote(
        &self,
        txn: &mut dyn StoreTransaction,
        node: &Node,
    ) -> Result<(DeleteReport, Scopes), TreeError> {
        let children = self.sibling_group(txn, Some(node.id))?;
        let group = self.sibling_group(txn, node.parent)?;
        let at = group.iter().position(|n| n.id == node.id).unwrap_or(group.len());
        let siblings: Vec<SiblingSlot> = group
            .iter()
            .filter(|n| n.id != node.id)
            .map(|n| SiblingSlot::new(n.id, n.priority))
            .collect();
        let child_ids: Vec<NodeId> = children.iter().map(|n| n.id).collect();

        let plan = self
            .ordering
            .splice(node.parent, &siblings, at, &child_ids)?;
        self.apply_priorities(txn, node.parent, &plan.updates, plan.renumbered)?;

        let parent_node = node
            .parent
            .map(|p| self.require_node(txn, p))
            .transpose()?;
        let parent_rows = self.parent_rows(txn, parent_node.as_ref())?;

        let mut edges_removed = 0;
        for (child, (id, priority)) in children.iter().zip(&plan.assigned) {
            edges_removed += self.rebuild_edges_for(txn, child, &parent_rows, node.depth)?;
            txn.update_node(
                *id,
                &NodePatch::default().parent(node.parent).priority(*priority),
            )?;
        }

        let own_rows: Vec<(NodeId, NodeId)> = txn
            .filter_edges(&EdgeFilter::DescendantIs(node.id))?
            .iter()
            .map(ClosureEdge::key)
            .collect();
        edges_removed += txn.delete_edges(&own_rows)?;
        txn.delete_node(node.id)?;

        let placed = plan.assigned.first().map(|(_, p)| *p).unwrap_or(node.priority);
        self.check_sibling_group(txn, node.parent, placed)?;

        let new_roots: Scopes = if node.parent.is_none() {
            child_ids.iter().map(|id| TreeScope::Tree(*id)).collect()
        } else {
            Scopes::new()
        };

        Ok((
            DeleteReport {
                removed: vec![node.id],
                promoted: child_ids,
                edges_removed,
            },
            new_roots,
        ))
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Every node whose name contains `query`, in tree order.
    fn search_all(&self, query: &str) -> Result<Vec<Node>, TreeError> {
        let needle = query.trim().to_lowercase();
        let key = generate_key(TreeScope::Forest, "search_all", &[&needle]);
        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            let hits = txn.filter_nodes(&NodeFilter::NameContains(needle.clone()))?;
            self.sort_nodes(&*txn, hits)
        })
    }

    /// Ids among `ids` that have at least one child.
    fn with_children(&self, ids: Vec<NodeId>) -> Result<HashSet<NodeId>, TreeError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let txn = self.store.begin()?;
        Ok(txn
            .filter_edges(&EdgeFilter::AncestorIn(ids))?
            .iter()
            .filter(|e| e.depth_delta == 1)
            .map(|e| e.ancestor)
            .collect())
    }

    /// Node, its full sibling group and its index in that group.
    fn sibling_position(&self, id: NodeId) -> Result<(Vec<Node>, usize), TreeError> {
        let node = self.get_node(id)?;
        let group = self.children_of(node.parent)?;
        let index = group
            .iter()
            .position(|n| n.id == id)
            .ok_or(TreeError::NotFound(id))?;
        Ok((group, index))
    }
}

fn root_of(node: &Node, rows: &[ClosureEdge]) -> NodeId {
    rows.iter()
        .max_by_key(|e| e.depth_delta)
        .map(|e| e.ancestor)
        .unwrap_or(node.id)
}

fn parent_arg(parent: Option<NodeId>) -> String {
    parent.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

impl<S: RecordStore, C: CacheBackend> TreeIndexApi for TreeIndexService<S, C> {
    fn insert(
        &self,
        draft: NewNode,
        parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node, TreeError> {
        let node = self.mutate(
            "insert",
            |txn| Ok(Scopes::from([self.group_scope(txn, parent)?])),
            |txn| {
                let parent_node = parent.map(|p| self.require_node(txn, p)).transpose()?;
                let parent_rows = self.parent_rows(txn, parent_node.as_ref())?;
                let depth = parent_node.as_ref().map(|p| p.depth + 1).unwrap_or(0);

                let sort_value = draft.sort_value(&self.config.sort_key);
                let (placement, plan) =
                    self.resolve_position(txn, parent, position, None, &sort_value)?;
                self.apply_priorities(txn, parent, &plan.updates, plan.renumbered)?;

                let id = txn.create_node(draft, placement.parent, placement.priority, depth)?;
                txn.insert_edges(edges_for_new_node(id, &parent_rows))?;
                self.check_sibling_group(txn, parent, placement.priority)?;

                let created = if parent.is_none() {
                    Scopes::from([TreeScope::Tree(id)])
                } else {
                    Scopes::new()
                };
                Ok((self.require_node(txn, id)?, created))
            },
        )?;

        info!(
            id = node.id,
            parent = ?node.parent,
            priority = node.priority,
            depth = node.depth,
            "node inserted"
        );
        Ok(node)
    }

    fn insert_sibling(
        &self,
        draft: NewNode,
        reference: NodeId,
        position: &str,
    ) -> Result<Node, TreeError> {
        let position = Position::parse(position, reference)?;
        let parent = self.get_node(reference)?.parent;
        self.insert(draft, parent, position)
    }

    fn move_node(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node, TreeError> {
        let moved = self.mutate(
            "move",
            |txn| {
                let node = self.require_node(txn, id)?;
                let mut scopes = Scopes::from([
                    self.node_scope(txn, id)?,
                    self.group_scope(txn, new_parent)?,
                ]);
                if node.is_root() {
                    scopes.insert(TreeScope::Forest);
                }
                Ok(scopes)
            },
            |txn| {
                let node = self.require_node(txn, id)?;
                if let Some(target) = new_parent {
                    if target == id || self.is_ancestor_in(txn, id, target)? {
                        return Err(TreeError::Cycle {
                            node: id,
                            new_parent: target,
                        });
                    }
                }

                let parent_node = new_parent
                    .map(|p| self.require_node(txn, p))
                    .transpose()?;
                let parent_rows = self.parent_rows(txn, parent_node.as_ref())?;
                let new_depth = parent_node.as_ref().map(|p| p.depth + 1).unwrap_or(0);

                let sort_value = node.sort_value(&self.config.sort_key);
                let (placement, plan) =
                    self.resolve_position(txn, new_parent, position, Some(id), &sort_value)?;
                self.apply_priorities(txn, new_parent, &plan.updates, plan.renumbered)?;

                if node.parent != new_parent {
                    let removed = self.rebuild_edges_for(txn, &node, &parent_rows, new_depth)?;
                    debug!(id, removed, "subtree closure rows rewritten");
                }
                txn.update_node(
                    id,
                    &NodePatch::default()
                        .parent(placement.parent)
                        .priority(placement.priority),
                )?;
                self.check_sibling_group(txn, new_parent, placement.priority)?;

                let created = if new_parent.is_none() && !node.is_root() {
                    Scopes::from([TreeScope::Tree(id)])
                } else {
                    Scopes::new()
                };
                Ok((self.require_node(txn, id)?, created))
            },
        )?;

        info!(
            id,
            parent = ?moved.parent,
            priority = moved.priority,
            depth = moved.depth,
            "node moved"
        );
        Ok(moved)
    }

    fn delete(&self, id: NodeId, mode: DeleteMode) -> Result<DeleteReport, TreeError> {
        let report = self.mutate(
            "delete",
            |txn| {
                let node = self.require_node(txn, id)?;
                let mut scopes = Scopes::from([self.node_scope(txn, id)?]);
                if node.is_root() {
                    scopes.insert(TreeScope::Forest);
                }
                Ok(scopes)
            },
            |txn| {
                let node = self.require_node(txn, id)?;
                self.ancestor_rows(txn, &node, true)?;
                match mode {
                    DeleteMode::Cascade => self.delete_cascade(txn, &node),
                    DeleteMode::Promote => self.delete_promote(txn, &node),
                }
            },
        )?;

        info!(
            id,
            ?mode,
            removed = report.removed.len(),
            promoted = report.promoted.len(),
            edges_removed = report.edges_removed,
            "node deleted"
        );
        Ok(report)
    }

    fn renumber_children(&self, parent: Option<NodeId>) -> Result<usize, TreeError> {
        // an already spread group is left alone: no write, no bump
        {
            let txn = self.store.begin()?;
            self.group_scope(&*txn, parent)?;
            let pending = self.renumber_updates(&*txn, parent);
            txn.rollback();
            if pending?.is_empty() {
                debug!(?parent, "sibling group already spread");
                return Ok(0);
            }
        }

        let rewritten = self.mutate(
            "renumber",
            |txn| Ok(Scopes::from([self.group_scope(txn, parent)?])),
            |txn| {
                let updates = self.renumber_updates(txn, parent)?;
                self.apply_priorities(txn, parent, &updates, !updates.is_empty())?;
                self.check_sibling_group(txn, parent, 0)?;
                Ok((updates.len(), Scopes::new()))
            },
        )?;

        info!(?parent, rewritten, "sibling group renumbered");
        Ok(rewritten)
    }

    fn get_node(&self, id: NodeId) -> Result<Node, TreeError> {
        let txn = self.store.begin()?;
        self.require_node(&*txn, id)
    }

    fn children_of(&self, parent: Option<NodeId>) -> Result<Vec<Node>, TreeError> {
        let scope = match parent {
            Some(id) => self.read_scope(id)?,
            None => TreeScope::Forest,
        };
        let key = generate_key(scope, "children_of", &[&parent_arg(parent)]);
        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            if let Some(id) = parent {
                self.require_node(&*txn, id)?;
            }
            self.sibling_group(&*txn, parent)
        })
    }

    fn ancestors_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError> {
        let scope = self.read_scope(id)?;
        let key = generate_key(scope, "ancestors_of", &[&id.to_string()]);
        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            let node = self.require_node(&*txn, id)?;
            self.load_ancestors(&*txn, &node)
        })
    }

    fn descendants_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError> {
        let scope = self.read_scope(id)?;
        let key = generate_key(scope, "descendants_of", &[&id.to_string()]);
        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            self.require_node(&*txn, id)?;
            let ids: Vec<NodeId> = txn
                .filter_edges(&EdgeFilter::AncestorIs(id))?
                .iter()
                .filter(|e| !e.is_self())
                .map(|e| e.descendant)
                .collect();
            let nodes = txn.filter_nodes(&NodeFilter::IdIn(ids))?;
            self.sort_nodes(&*txn, nodes)
        })
    }

    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, TreeError> {
        let txn = self.store.begin()?;
        self.require_node(&*txn, ancestor)?;
        self.require_node(&*txn, descendant)?;
        self.is_ancestor_in(&*txn, ancestor, descendant)
    }

    fn sort_subset(&self, ids: &[NodeId]) -> Result<Vec<Node>, TreeError> {
        let unique: BTreeSet<NodeId> = ids.iter().copied().collect();
        let args: Vec<String> = unique.iter().map(|id| id.to_string()).collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let key = generate_key(TreeScope::Forest, "sort_subset", &args);

        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            let nodes = txn.filter_nodes(&NodeFilter::IdIn(unique.iter().copied().collect()))?;
            if nodes.len() != unique.len() {
                let found: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
                if let Some(missing) = unique.iter().find(|id| !found.contains(id)) {
                    return Err(TreeError::NotFound(*missing));
                }
            }
            self.sort_nodes(&*txn, nodes)
        })
    }

    fn breadcrumb_path(&self, id: NodeId, display_attr: &str) -> Result<Vec<String>, TreeError> {
        let scope = self.read_scope(id)?;
        let key = generate_key(scope, "breadcrumb_path", &[&id.to_string(), display_attr]);
        self.cache.get_or_compute(key, || {
            let txn = self.store.begin()?;
            let node = self.require_node(&*txn, id)?;
            let mut labels: Vec<String> = self
                .load_ancestors(&*txn, &node)?
                .iter()
                .map(|n| n.display(display_attr))
                .collect();
            labels.push(node.display(display_attr));
            Ok(labels)
        })
    }

    fn siblings_of(&self, id: NodeId) -> Result<Vec<Node>, TreeError> {
        let (mut group, index) = self.sibling_position(id)?;
        group.remove(index);
        Ok(group)
    }

    fn first_sibling(&self, id: NodeId) -> Result<Node, TreeError> {
        let (group, _) = self.sibling_position(id)?;
        group.into_iter().next().ok_or(TreeError::NotFound(id))
    }

    fn last_sibling(&self, id: NodeId) -> Result<Node, TreeError> {
        let (group, _) = self.sibling_position(id)?;
        group.into_iter().last().ok_or(TreeError::NotFound(id))
    }

    fn previous_sibling(&self, id: NodeId) -> Result<Option<Node>, TreeError> {
        let (group, index) = self.sibling_position(id)?;
        Ok(index.checked_sub(1).and_then(|i| group.get(i).cloned()))
    }

    fn next_sibling(&self, id: NodeId) -> Result<Option<Node>, TreeError> {
        let (group, index) = self.sibling_position(id)?;
        Ok(group.get(index + 1).cloned())
    }

    fn children_count(&self, id: NodeId) -> Result<usize, TreeError> {
        Ok(self.children_of(Some(id))?.len())
    }

    fn is_leaf(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(self.children_count(id)? == 0)
    }

    fn search(&self, query: &str) -> Result<Vec<Node>, TreeError> {
        let mut hits = self.search_all(query)?;
        hits.truncate(self.config.search_limit);
        debug!(query, hits = hits.len(), "search");
        Ok(hits)
    }

    fn search_window(
        &self,
        query: &str,
        selected: Option<NodeId>,
        direction: WindowDirection,
        limit: usize,
    ) -> Result<SearchWindow, TreeError> {
        let all = self.search_all(query)?;

        let Some(selected) = selected else {
            let results: Vec<Node> = all.into_iter().take(limit.saturating_mul(2)).collect();
            let reference_id = results.last().map(|n| n.id);
            return Ok(SearchWindow {
                results,
                reference_id,
            });
        };

        self.get_node(selected)?;
        let index = all
            .iter()
            .position(|n| n.id == selected)
            .ok_or(TreeError::NotFound(selected))?;

        let (range, reference_id) = match direction {
            WindowDirection::Up => {
                let range = index.saturating_sub(limit)..index;
                let reference = if range.is_empty() {
                    selected
                } else {
                    all[range.start].id
                };
                (range, reference)
            }
            WindowDirection::Down => {
                let end = all.len().min(index.saturating_add(limit).saturating_add(1));
                let range = index + 1..end;
                let reference = if range.is_empty() {
                    selected
                } else {
                    all[end - 1].id
                };
                (range, reference)
            }
            WindowDirection::Center => {
                let end = all.len().min(index.saturating_add(limit).saturating_add(1));
                (index.saturating_sub(limit)..end, selected)
            }
        };

        Ok(SearchWindow {
            results: all[range].to_vec(),
            reference_id: Some(reference_id),
        })
    }

    fn children_view(
        &self,
        parent: Option<NodeId>,
        mode: &DisplayMode,
    ) -> Result<Vec<NodeView>, TreeError> {
        let children = self.children_of(parent)?;
        let branches = self.with_children(children.iter().map(|n| n.id).collect())?;

        let path = match parent {
            Some(id) if mode.needs_path() => {
                let mut path = self.ancestors_of(id)?;
                path.push(self.get_node(id)?);
                path
            }
            _ => Vec::new(),
        };

        Ok(children
            .iter()
            .map(|child| mode.view(child, &path, !branches.contains(&child.id)))
            .collect())
    }

    fn verify_integrity(&self, root: NodeId) -> Result<(), TreeError> {
        let txn = self.store.begin()?;
        let top = self.require_node(&*txn, root)?;
        let top_rows = self.ancestor_rows(&*txn, &top, true)?;
        let scope = TreeScope::Tree(root_of(&top, &top_rows));

        // walk parent pointers; a node reached twice means they loop
        let mut nodes = vec![top.clone()];
        let mut visited: HashSet<NodeId> = HashSet::from([top.id]);
        let mut frontier = vec![top.id];
        while let Some(id) = frontier.pop() {
            for child in txn.filter_nodes(&NodeFilter::ParentIs(Some(id)))? {
                if !visited.insert(child.id) {
                    return Err(self.integrity_failure(TreeError::Integrity {
                        scope,
                        expected: nodes.len(),
                        actual: nodes.len() + 1,
                    }));
                }
                frontier.push(child.id);
                nodes.push(child);
            }
        }

        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let mut rows = txn.filter_edges(&EdgeFilter::DescendantIn(ids))?;
        let indexed_below = txn.filter_edges(&EdgeFilter::AncestorIs(root))?.len();

        // Rows above the checked node are compared as if it were a root.
        let outside: HashSet<NodeId> = top_rows
            .iter()
            .filter(|e| !e.is_self())
            .map(|e| e.ancestor)
            .collect();
        rows.retain(|e| !outside.contains(&e.ancestor));
        let mut relative: Vec<Node> = nodes.clone();
        for node in relative.iter_mut() {
            node.depth = node.depth.saturating_sub(top.depth);
            if node.id == top.id {
                node.parent = None;
            }
        }
        let expected = expected_edge_count(&relative);

        let consistent = rows.len() == expected
            && indexed_below == nodes.len()
            && invariant_closure_exact(&relative, &rows)
            && invariant_depths(&relative);
        if !consistent {
            return Err(self.integrity_failure(TreeError::Integrity {
                scope,
                expected,
                actual: rows.len(),
            }));
        }

        if !invariant_unique_priorities(&nodes[1..]) {
            let mut seen: HashSet<(Option<NodeId>, Priority)> = HashSet::new();
            if let Some(dup) = nodes[1..].iter().find(|n| !seen.insert((n.parent, n.priority))) {
                return Err(TreeError::PriorityConflict {
                    parent: dup.parent,
                    priority: dup.priority,
                });
            }
        }

        debug!(root, nodes = nodes.len(), edges = rows.len(), "integrity verified");
        Ok(())
    }

    fn rebuild_index(&self) -> Result<usize, TreeError> {
        let written = self.mutate(
            "rebuild_index",
            |txn| {
                let mut scopes: Scopes = txn
                    .filter_nodes(&NodeFilter::ParentIs(None))?
                    .iter()
                    .map(|n| TreeScope::Tree(n.id))
                    .collect();
                scopes.insert(TreeScope::Forest);
                Ok(scopes)
            },
            |txn| {
                let nodes = txn.filter_nodes(&NodeFilter::All)?;
                let closure = full_closure(&nodes).map_err(|e| self.integrity_failure(e))?;

                let existing: Vec<(NodeId, NodeId)> = txn
                    .filter_edges(&EdgeFilter::All)?
                    .iter()
                    .map(ClosureEdge::key)
                    .collect();
                txn.delete_edges(&existing)?;

                let written = closure.edges.len();
                txn.insert_edges(closure.edges)?;

                let depths: BTreeMap<NodeId, Depth> = closure.depths.into_iter().collect();
                for node in &nodes {
                    match depths.get(&node.id) {
                        Some(depth) if *depth != node.depth => {
                            txn.update_node(node.id, &NodePatch::default().depth(*depth))?;
                        }
                        _ => {}
                    }
                }
                Ok((written, Scopes::new()))
            },
        )?;

        info!(edges = written, "closure index rebuilt");
        Ok(written)
    }

    fn flush_cache(&self) -> Result<(), TreeError> {
        let txn = self.store.begin()?;
        let mut scopes: Scopes = txn
            .filter_nodes(&NodeFilter::ParentIs(None))?
            .iter()
            .map(|n| TreeScope::Tree(n.id))
            .collect();
        scopes.extend(self.cache.generations().snapshot().into_keys());
        scopes.insert(TreeScope::Forest);

        let dropped: usize = scopes.iter().map(|s| self.cache.clear_scope(*s)).sum();
        info!(scopes = scopes.len(), dropped, "cache flushed");
        Ok(())
    }
}
