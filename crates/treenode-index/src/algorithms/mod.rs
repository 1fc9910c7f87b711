//! Algorithms module for the hierarchical index
//!
//! Contains:
//! - Closure table edge arithmetic
//! - Sibling priority assignment
//! - Tree-order sort by ordinal path

pub mod closure;
pub mod ordering;
pub mod tree_sort;

pub use closure::{full_closure, FullClosure};
pub use ordering::{
    priorities_unique, sorted_anchor, Anchor, PriorityPlan, SiblingOrdering, SiblingSlot, SplicePlan,
};
pub use tree_sort::{tree_order, OrdinalPath};
