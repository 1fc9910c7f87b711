//! # Treenode Index Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion workloads over the in-memory stack
//! │   └── tree_index.rs
//! │
//! └── integration/      # End-to-end flows through TreeIndexApi
//!     ├── flows.rs
//!     ├── cache_coherence.rs
//!     └── concurrency.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p treenode-tests
//!
//! # By category
//! cargo test -p treenode-tests integration::flows
//! cargo test -p treenode-tests integration::concurrency
//!
//! # Benchmarks
//! cargo bench -p treenode-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod benchmarks;
pub mod integration;
