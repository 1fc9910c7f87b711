//! Per-scope generation counters
//!
//! Bumped by the mutation path after a commit, read by the cache to decide
//! whether an entry is still current. Counters start at zero and never go
//! back.

use crate::domain::value_objects::{Generation, TreeScope};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct GenerationTracker {
    generations: RwLock<HashMap<TreeScope, Generation>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of `scope` (0 if never bumped).
    pub fn current(&self, scope: TreeScope) -> Generation {
        self.generations.read().get(&scope).copied().unwrap_or(0)
    }

    /// Increment `scope` and return the new value.
    pub fn bump(&self, scope: TreeScope) -> Generation {
        let mut generations = self.generations.write();
        let entry = generations.entry(scope).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Increment every scope in one critical section.
    pub fn bump_all<'a>(&self, scopes: impl IntoIterator<Item = &'a TreeScope>) {
        let mut generations = self.generations.write();
        for scope in scopes {
            *generations.entry(*scope).or_insert(0) += 1;
        }
    }

    /// Copy of every tracked counter.
    pub fn snapshot(&self) -> HashMap<TreeScope, Generation> {
        self.generations.read().clone()
    }
}
