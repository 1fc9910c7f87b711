//! # Index Metrics
//!
//! Lock-free counters for the mutation path and the cache.
//!
//! ## Metrics Exported
//!
//! - Committed mutations and sibling renumbers
//! - Cache hits, misses and stale entries
//! - Integrity failures and lock retries

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the service and its cache.
#[derive(Debug, Default)]
pub struct IndexMetrics {
    /// Committed structural mutations
    pub mutations: AtomicU64,
    /// Mutations rolled back on error
    pub rollbacks: AtomicU64,
    /// Sibling groups spread to the configured spacing
    pub renumbers: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Entries found but older than their scope's generation
    pub cache_stale: AtomicU64,
    /// Cache backend faults treated as misses
    pub cache_errors: AtomicU64,
    pub integrity_failures: AtomicU64,
    /// Scope lock acquisitions retried after a timeout or scope change
    pub lock_retries: AtomicU64,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_renumber(&self) {
        self.renumbers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A stale entry also counts as a miss.
    pub fn record_stale(&self) {
        self.cache_stale.fetch_add(1, Ordering::Relaxed);
        self.record_miss();
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_retry(&self) {
        self.lock_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit ratio over all lookups (0.0 with no traffic).
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mutations: self.mutations.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            renumbers: self.renumbers.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_stale: self.cache_stale.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            lock_retries: self.lock_retries.load(Ordering::Relaxed),
        }
    }

    /// Export as Prometheus-style metrics string
    pub fn export_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("treenode_mutations", "Committed structural mutations", s.mutations),
            ("treenode_rollbacks", "Rolled back mutations", s.rollbacks),
            ("treenode_renumbers", "Sibling group renumbers", s.renumbers),
            ("treenode_cache_hits", "Cache hits", s.cache_hits),
            ("treenode_cache_misses", "Cache misses", s.cache_misses),
            ("treenode_cache_stale", "Stale cache entries dropped", s.cache_stale),
            ("treenode_cache_errors", "Cache backend faults", s.cache_errors),
            ("treenode_integrity_failures", "Integrity check failures", s.integrity_failures),
            ("treenode_lock_retries", "Scope lock retries", s.lock_retries),
        ];
        counters
            .iter()
            .map(|(name, help, value)| {
                format!(
                    "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n",
                    name = name,
                    help = help,
                    value = value
                )
            })
            .collect()
    }
}

/// Serializable copy of [`IndexMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub mutations: u64,
    pub rollbacks: u64,
    pub renumbers: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_stale: u64,
    pub cache_errors: u64,
    pub integrity_failures: u64,
    pub lock_retries: u64,
}
