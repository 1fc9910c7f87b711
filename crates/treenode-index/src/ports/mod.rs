//! Ports module for the hierarchical index
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::TreeIndexApi;
pub use outbound::{CacheBackend, EdgeFilter, NodeFilter, RecordStore, StoreTransaction};
