//! Adapters for the outbound ports
//!
//! In-process implementations used by tests and by embedding applications
//! that keep the whole forest in memory.

pub mod lru_cache;
pub mod memory_store;

pub use lru_cache::LruCacheBackend;
pub use memory_store::InMemoryRecordStore;
