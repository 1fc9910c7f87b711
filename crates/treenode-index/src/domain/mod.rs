//! Domain module for the hierarchical index
//!
//! Contains core entities, value objects, errors, invariants and view modes.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;
pub mod views;

pub use entities::*;
pub use errors::*;
pub use value_objects::*;
pub use views::*;
