//! # Treenode Index
//!
//! Hierarchical index engine for forests of ordered trees.
//!
//! Every node carries a parent reference, a sibling priority and a cached
//! depth. A closure table holds one row per (ancestor, descendant) pair, so
//! ancestor, descendant and subtree queries are single filtered reads, and
//! any subset of nodes can be put in depth-first tree order without
//! walking the tree.
//!
//! ## Architecture
//!
//! - **Domain**: Core entities (Node, ClosureEdge, DeleteReport), invariants, view modes
//! - **Algorithms**: Closure arithmetic, sibling priority protocol, tree-order sort
//! - **Ports**: Inbound (TreeIndexApi) and Outbound (RecordStore, StoreTransaction, CacheBackend)
//! - **Cache**: Generation-checked cache of derived views, one generation per tree
//! - **Adapters**: In-memory record store and LRU cache backend
//! - **Application**: Service orchestration and scope locks
//!
//! ## Guarantees
//!
//! - A mutation either commits its node, priority and closure rewrites
//!   together or leaves the store untouched
//! - Closure rows always equal the transitive closure of the parent
//!   relation; `verify_integrity` checks it, `rebuild_index` restores it
//! - A cached view is never served after a committed mutation of its tree

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod telemetry;

pub use adapters::{InMemoryRecordStore, LruCacheBackend};
pub use application::service::TreeIndexService;
pub use config::{ConfigError, TreeIndexConfig};
pub use domain::entities::*;
pub use domain::errors::{CacheError, StoreError, TreeError};
pub use domain::value_objects::*;
pub use domain::views::DisplayMode;
pub use metrics::{IndexMetrics, MetricsSnapshot};
pub use ports::inbound::TreeIndexApi;
pub use ports::outbound::{CacheBackend, EdgeFilter, NodeFilter, RecordStore, StoreTransaction};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
