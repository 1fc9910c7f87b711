//! # Generation-Tagged Cache
//!
//! Every entry records the generation of its scope at the moment the value
//! was computed. A mutation bumps the generation of each scope it touched,
//! which turns all older entries of those scopes into misses without a
//! sweep; stale entries are deleted when next read.
//!
//! Writes are set-if-absent-or-stale: a value computed under an older
//! generation never replaces a newer one, and a value whose generation is
//! already behind the scope is not stored at all.
//!
//! Backend faults never fail a read. They are logged and treated as a miss.

use super::generation::GenerationTracker;
use super::key::{CacheEntry, CacheKey};
use crate::domain::errors::{CacheError, TreeError};
use crate::domain::value_objects::{Generation, TreeScope};
use crate::metrics::IndexMetrics;
use crate::ports::outbound::CacheBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct InvalidatingCache<C: CacheBackend> {
    backend: C,
    generations: GenerationTracker,
    ttl: Option<Duration>,
    metrics: Arc<IndexMetrics>,
}

impl<C: CacheBackend> InvalidatingCache<C> {
    pub fn new(backend: C, ttl: Option<Duration>, metrics: Arc<IndexMetrics>) -> Self {
        Self {
            backend,
            generations: GenerationTracker::new(),
            ttl,
            metrics,
        }
    }

    pub fn generation(&self, scope: TreeScope) -> Generation {
        self.generations.current(scope)
    }

    /// Raw payload for `key`, or `None` on miss.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let entry = match self.backend.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.metrics.record_miss();
                debug!(scope = %key.scope, "cache miss");
                return None;
            }
            Err(e) => {
                self.backend_fault("get", &e);
                self.metrics.record_miss();
                return None;
            }
        };

        let current = self.generations.current(key.scope);
        if entry.generation < current {
            self.metrics.record_stale();
            debug!(
                scope = %key.scope,
                entry_generation = entry.generation,
                current,
                "stale cache entry dropped"
            );
            if let Err(e) = self.backend.delete(key) {
                self.backend_fault("delete", &e);
            }
            return None;
        }

        self.metrics.record_hit();
        debug!(scope = %key.scope, generation = entry.generation, "cache hit");
        Some(entry.payload)
    }

    /// Store `payload` under the scope's current generation.
    pub fn set(&self, key: CacheKey, payload: String) -> bool {
        let generation = self.generations.current(key.scope);
        self.set_at(key, payload, generation)
    }

    /// Store `payload` as computed under `generation`. Skipped when the
    /// scope has already moved past it.
    pub fn set_at(&self, key: CacheKey, payload: String, generation: Generation) -> bool {
        let current = self.generations.current(key.scope);
        if generation < current {
            debug!(scope = %key.scope, generation, current, "discarding value computed under an old generation");
            return false;
        }

        match self
            .backend
            .set(key, CacheEntry::new(generation, payload), self.ttl)
        {
            Ok(stored) => stored,
            Err(e) => {
                self.backend_fault("set", &e);
                false
            }
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.backend_fault("decode", &CacheError::from(e));
                if let Err(e) = self.backend.delete(key) {
                    self.backend_fault("delete", &e);
                }
                None
            }
        }
    }

    fn set_json_at<T: Serialize>(&self, key: CacheKey, value: &T, generation: Generation) -> bool {
        match serde_json::to_string(value) {
            Ok(payload) => self.set_at(key, payload, generation),
            Err(e) => {
                self.backend_fault("encode", &CacheError::from(e));
                false
            }
        }
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The generation is read before `compute` runs, so a mutation that
    /// commits during the computation leaves the stored value stale.
    pub fn get_or_compute<T, F>(&self, key: CacheKey, compute: F) -> Result<T, TreeError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, TreeError>,
    {
        if let Some(value) = self.get_json(&key) {
            return Ok(value);
        }

        let observed = self.generations.current(key.scope);
        let value = compute()?;
        self.set_json_at(key, &value, observed);
        Ok(value)
    }

    /// Drop every entry of `scope` and advance its generation.
    pub fn clear_scope(&self, scope: TreeScope) -> usize {
        self.generations.bump(scope);
        match self.backend.clear_scope(scope) {
            Ok(dropped) => {
                debug!(%scope, dropped, "cache scope cleared");
                dropped
            }
            Err(e) => {
                self.backend_fault("clear_scope", &e);
                0
            }
        }
    }

    /// Invalidate `scope`. Called by the mutation path after a commit.
    pub fn bump(&self, scope: TreeScope) -> Generation {
        self.generations.bump(scope)
    }

    pub fn bump_all<'a>(&self, scopes: impl IntoIterator<Item = &'a TreeScope>) {
        self.generations.bump_all(scopes)
    }

    pub fn generations(&self) -> &GenerationTracker {
        &self.generations
    }

    fn backend_fault(&self, op: &str, err: &CacheError) {
        self.metrics.record_cache_error();
        warn!(op, error = %err, "cache backend fault treated as miss");
    }
}
