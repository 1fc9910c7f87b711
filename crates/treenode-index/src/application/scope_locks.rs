//! Advisory mutation locks keyed by [`TreeScope`]
//!
//! A mutation claims every scope it touches in one step: either all of
//! them are free and become held, or the caller waits (up to a timeout)
//! until they are. Claiming a set atomically rules out lock-order
//! deadlocks between mutations with overlapping scopes.

use crate::domain::value_objects::TreeScope;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct ScopeLocks {
    held: Mutex<HashSet<TreeScope>>,
    released: Condvar,
}

/// Held scopes; released on drop.
#[must_use]
pub struct ScopeGuard<'a> {
    locks: &'a ScopeLocks,
    scopes: BTreeSet<TreeScope>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `scopes`, waiting at most `timeout`. `None` on timeout.
    pub fn acquire(
        &self,
        scopes: &BTreeSet<TreeScope>,
        timeout: Duration,
    ) -> Option<ScopeGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();

        while scopes.iter().any(|s| held.contains(s)) {
            if self.released.wait_until(&mut held, deadline).timed_out()
                && scopes.iter().any(|s| held.contains(s))
            {
                return None;
            }
        }

        held.extend(scopes.iter().copied());
        Some(ScopeGuard {
            locks: self,
            scopes: scopes.clone(),
        })
    }

    pub fn is_held(&self, scope: TreeScope) -> bool {
        self.held.lock().contains(&scope)
    }
}

impl ScopeGuard<'_> {
    pub fn scopes(&self) -> &BTreeSet<TreeScope> {
        &self.scopes
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for scope in &self.scopes {
            held.remove(scope);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
