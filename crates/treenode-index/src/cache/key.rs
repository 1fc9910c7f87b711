//! Cache keys and entries
//!
//! A key pairs the scope it is invalidated with and a fingerprint of the
//! operation that produced the value. Fingerprints are SHA-256 over
//! length-prefixed parts, so they are stable across processes and no two
//! argument lists can collide by concatenation.

use crate::domain::value_objects::{Generation, TreeScope};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Key of one cached view.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: TreeScope,
    /// Hex SHA-256 of scope, operation and arguments
    pub fingerprint: String,
}

/// Derive the key for `operation(args...)` inside `scope`.
pub fn generate_key(scope: TreeScope, operation: &str, args: &[&str]) -> CacheKey {
    let mut hasher = Sha256::new();
    let tag = scope.tag();
    for part in std::iter::once(tag.as_str())
        .chain(std::iter::once(operation))
        .chain(args.iter().copied())
    {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }

    CacheKey {
        scope,
        fingerprint: hex::encode(hasher.finalize()),
    }
}

/// Immutable cached value tagged with the generation it was computed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub generation: Generation,
    /// serde_json encoding of the view
    pub payload: String,
    pub stored_at: Instant,
}

impl CacheEntry {
    pub fn new(generation: Generation, payload: String) -> Self {
        Self {
            generation,
            payload,
            stored_at: Instant::now(),
        }
    }
}
