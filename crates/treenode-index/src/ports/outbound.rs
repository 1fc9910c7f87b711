//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the index service.
//!
//! These are the interfaces the host application implements: a
//! transactional record store holding the node and closure tables, and a
//! key/value cache backend.

use crate::cache::{CacheEntry, CacheKey};
use crate::domain::entities::{ClosureEdge, NewNode, Node, NodePatch};
use crate::domain::errors::{CacheError, StoreError};
use crate::domain::value_objects::{Depth, NodeId, Priority, TreeScope};
use std::time::Duration;

/// Node table predicate.
///
/// Filters are plain data so a SQL backend can translate each variant into
/// an indexed predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    /// Children of a parent, or the roots for `None`
    ParentIs(Option<NodeId>),
    IdIn(Vec<NodeId>),
    /// Case-insensitive substring match on the name
    NameContains(String),
}

/// Closure table predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeFilter {
    All,
    /// Rows below one node (its subtree, self row included)
    AncestorIs(NodeId),
    /// Rows above one node (its ancestor chain, self row included)
    DescendantIs(NodeId),
    AncestorIn(Vec<NodeId>),
    DescendantIn(Vec<NodeId>),
}

/// Transactional record store.
///
/// Testing and embedding: `InMemoryRecordStore` (adapters/memory_store.rs)
pub trait RecordStore: Send + Sync {
    /// Open a transaction. Reads inside it see a consistent snapshot plus
    /// the transaction's own writes.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

/// One all-or-nothing unit of work against the two tables.
///
/// Dropping a transaction without committing discards its writes.
pub trait StoreTransaction {
    fn get_node(&self, id: NodeId) -> Result<Option<Node>, StoreError>;

    fn filter_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError>;

    /// Insert a node; the store assigns the id.
    fn create_node(
        &mut self,
        draft: NewNode,
        parent: Option<NodeId>,
        priority: Priority,
        depth: Depth,
    ) -> Result<NodeId, StoreError>;

    fn update_node(&mut self, id: NodeId, patch: &NodePatch) -> Result<(), StoreError>;

    fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError>;

    fn filter_edges(&self, filter: &EdgeFilter) -> Result<Vec<ClosureEdge>, StoreError>;

    fn insert_edges(&mut self, edges: Vec<ClosureEdge>) -> Result<(), StoreError>;

    /// Remove rows by `(ancestor, descendant)`; returns how many existed.
    fn delete_edges(&mut self, pairs: &[(NodeId, NodeId)]) -> Result<usize, StoreError>;

    /// Apply every write atomically.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>);
}

/// Generic key/value cache. No persistence across restarts is assumed.
///
/// Testing and embedding: `LruCacheBackend` (adapters/lru_cache.rs)
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `entry` unless a live entry of the same or a newer generation
    /// is already present. Returns whether the entry was written.
    fn set(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Drop every entry of one scope; returns how many were dropped.
    fn clear_scope(&self, scope: TreeScope) -> Result<usize, CacheError>;
}
