//! Configuration for the hierarchical index

use crate::domain::value_objects::{Priority, SortKey};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("priority_spacing must be at least 2, got {0}")]
    Spacing(Priority),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Index configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndexConfig {
    /// Gap between siblings after a renumber
    pub priority_spacing: Priority,
    /// Maximum cached views
    pub cache_capacity: usize,
    /// Secondary expiry for cached views (generation check always applies)
    pub cache_ttl_secs: Option<u64>,
    /// How long a mutation waits for one scope lock
    pub lock_timeout_ms: u64,
    /// Extra lock acquisitions before giving up with a retryable error
    pub lock_retries: u32,
    /// Cap on `search` results
    pub search_limit: usize,
    /// Comparison field for sorted-sibling insertion
    pub sort_key: SortKey,
    /// Verify the ancestor chain of every node read through the index
    pub integrity_check_on_read: bool,
}

impl Default for TreeIndexConfig {
    fn default() -> Self {
        Self {
            priority_spacing: 1024,
            cache_capacity: 10_000,
            cache_ttl_secs: None,
            lock_timeout_ms: 2_000,
            lock_retries: 3,
            search_limit: 20,
            sort_key: SortKey::Name,
            integrity_check_on_read: true,
        }
    }
}

impl TreeIndexConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TN_PRIORITY_SPACING` (default: 1024)
    /// - `TN_CACHE_CAPACITY` (default: 10000)
    /// - `TN_CACHE_TTL_SECS` (default: unset, no expiry)
    /// - `TN_LOCK_TIMEOUT_MS` (default: 2000)
    /// - `TN_LOCK_RETRIES` (default: 3)
    /// - `TN_SEARCH_LIMIT` (default: 20)
    /// - `TN_SORT_ATTRIBUTE`: attribute compared by sorted insertion
    ///   (default: unset, the node name)
    /// - `TN_INTEGRITY_CHECK`: `false`/`0` disables read checks
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            priority_spacing: parse_var(&lookup, "TN_PRIORITY_SPACING")
                .unwrap_or(defaults.priority_spacing),
            cache_capacity: parse_var(&lookup, "TN_CACHE_CAPACITY")
                .unwrap_or(defaults.cache_capacity),
            cache_ttl_secs: parse_var(&lookup, "TN_CACHE_TTL_SECS")
                .or(defaults.cache_ttl_secs),
            lock_timeout_ms: parse_var(&lookup, "TN_LOCK_TIMEOUT_MS")
                .unwrap_or(defaults.lock_timeout_ms),
            lock_retries: parse_var(&lookup, "TN_LOCK_RETRIES")
                .unwrap_or(defaults.lock_retries),
            search_limit: parse_var(&lookup, "TN_SEARCH_LIMIT")
                .unwrap_or(defaults.search_limit),
            sort_key: lookup("TN_SORT_ATTRIBUTE")
                .filter(|v| !v.trim().is_empty())
                .map(|v| SortKey::Attribute(v.trim().to_string()))
                .unwrap_or(defaults.sort_key),
            integrity_check_on_read: lookup("TN_INTEGRITY_CHECK")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.integrity_check_on_read),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.priority_spacing < 2 {
            return Err(ConfigError::Spacing(self.priority_spacing));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Zero("cache_capacity"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Zero("lock_timeout_ms"));
        }
        if self.search_limit == 0 {
            return Err(ConfigError::Zero("search_limit"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
