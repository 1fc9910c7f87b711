//! # Integration Tests
//!
//! Multi-operation scenarios run against the in-memory record store and
//! LRU cache backend, checking the closure index after every step.

pub mod cache_coherence;
pub mod concurrency;
pub mod flows;

use treenode_index::domain::invariants::{
    expected_edge_count, invariant_closure_exact, invariant_depths, invariant_unique_priorities,
};
use treenode_index::{
    InMemoryRecordStore, LruCacheBackend, NewNode, NodeId, Position, TreeIndexApi,
    TreeIndexConfig, TreeIndexService,
};

pub type MemoryService = TreeIndexService<InMemoryRecordStore, LruCacheBackend>;

/// Service over an empty in-memory store with default configuration.
pub fn memory_service() -> MemoryService {
    TreeIndexService::in_memory(TreeIndexConfig::default()).expect("default config is valid")
}

/// Append `name` as the last child of `parent`.
pub fn append(api: &dyn TreeIndexApi, name: &str, parent: Option<NodeId>) -> NodeId {
    api.insert(NewNode::new(name), parent, Position::LastSibling)
        .expect("append")
        .id
}

/// Full-table check of the committed state.
pub fn assert_index_consistent(service: &MemoryService) {
    let nodes = service.store().nodes();
    let edges = service.store().edges();
    assert_eq!(edges.len(), expected_edge_count(&nodes), "edge count");
    assert!(invariant_closure_exact(&nodes, &edges), "closure rows");
    assert!(invariant_unique_priorities(&nodes), "sibling priorities");
    assert!(invariant_depths(&nodes), "depths");
}
