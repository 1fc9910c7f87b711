//! Invalidating cache for derived views
//!
//! Contains:
//! - Cache keys, entries and fingerprinting
//! - Per-scope generation tracking
//! - The generation-checked cache front end

pub mod generation;
pub mod invalidating;
pub mod key;

pub use generation::GenerationTracker;
pub use invalidating::InvalidatingCache;
pub use key::{generate_key, CacheEntry, CacheKey};
