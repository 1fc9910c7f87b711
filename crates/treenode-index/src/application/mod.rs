//! Application layer
//!
//! Service orchestration and the advisory scope locks mutations hold.

pub mod scope_locks;
pub mod service;

pub use scope_locks::{ScopeGuard, ScopeLocks};
pub use service::TreeIndexService;
