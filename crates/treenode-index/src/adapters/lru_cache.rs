//! # LRU Cache Backend
//!
//! Bounded in-process `CacheBackend`. Least recently used entries are
//! evicted at capacity; an optional TTL expires entries on read.

use crate::cache::{CacheEntry, CacheKey};
use crate::domain::errors::CacheError;
use crate::domain::value_objects::TreeScope;
use crate::ports::outbound::CacheBackend;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Slot {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

pub struct LruCacheBackend {
    entries: Mutex<LruCache<CacheKey, Slot>>,
}

impl LruCacheBackend {
    /// Create with room for `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl CacheBackend for LruCacheBackend {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(slot) if slot.is_expired(Instant::now()) => true,
            Some(slot) => return Ok(Some(slot.entry.clone())),
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.peek(&key) {
            if !existing.is_expired(now) && existing.entry.generation >= entry.generation {
                return Ok(false);
            }
        }

        entries.put(
            key,
            Slot {
                entry,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.lock().pop(key);
        Ok(())
    }

    fn clear_scope(&self, scope: TreeScope) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.scope == scope)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len())
    }
}
