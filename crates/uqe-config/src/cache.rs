//! Result cache configuration.

use serde::{Deserialize, Serialize};

/// Which key-value store backs the result cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local expiring map.
    #[default]
    Memory,
    /// libSQL table, shared by every process using the same file.
    Libsql,
    /// No store; every cache operation is a no-op.
    None,
}

const fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    ".uqe/cache.db".to_string()
}

/// Default bound on a single cache store operation, in milliseconds.
const fn default_op_timeout_ms() -> u64 {
    250
}

const fn default_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Master switch; when false the cache runs in unavailable mode.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackend,

    /// Database file for the `libsql` backend.
    #[serde(default = "default_path")]
    pub path: String,

    /// Upper bound on any single store call.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// TTL used when a definition enables caching without a usable TTL.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: CacheBackend::default(),
            path: default_path(),
            op_timeout_ms: default_op_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Whether a store should be opened at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.backend != CacheBackend::None
    }
}
