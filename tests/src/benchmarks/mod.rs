//! # Treenode Index Benchmarks
//!
//! Criterion workloads over the in-memory store and LRU cache backend.

pub mod tree_index;
