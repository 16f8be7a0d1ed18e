//! Result cache keyed by definition, version, and canonical parameters.
//!
//! The cache is strictly optional. Every store call is bounded by a timeout
//! and any failure degrades to a miss (reads) or a logged no-op (writes).

pub mod store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uqe_core::{QueryDefinition, QueryResult};

use crate::coerce::stringify;
use crate::error::StoreError;
pub use store::{CacheStore, LibsqlStore, MemoryStore};

/// Prefix shared by every cache key.
pub const KEY_PREFIX: &str = "query";

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct QueryCache {
    store: Option<Arc<dyn CacheStore>>,
    op_timeout: Duration,
    default_ttl: Duration,
}

impl QueryCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            op_timeout: DEFAULT_OP_TIMEOUT,
            default_ttl: Duration::from_secs(300),
        }
    }

    /// A cache with no store: every operation is a neutral no-op.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            store: None,
            op_timeout: DEFAULT_OP_TIMEOUT,
            default_ttl: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// TTL used when a definition's own TTL is zero.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Derive the cache key for a definition and parameter bag.
    ///
    /// Without a template: `query:<id>:<version>:<8 hex digits>`. With a
    /// template, `{{name}}`, `{{id}}`, and `{{version}}` tokens are
    /// substituted and the result is prefixed with `query:<id>:`.
    #[must_use]
    pub fn key(definition: &QueryDefinition, parameters: &Map<String, Value>) -> String {
        let template = definition
            .cache
            .as_ref()
            .and_then(|c| c.key_template.as_deref())
            .filter(|t| !t.trim().is_empty());

        match template {
            Some(template) => {
                let mut key = template
                    .replace("{{id}}", &definition.id)
                    .replace("{{version}}", &definition.version);
                for (name, value) in parameters {
                    key = key.replace(&format!("{{{{{name}}}}}"), &stringify(value));
                }
                format!("{KEY_PREFIX}:{}:{key}", definition.id)
            }
            None => format!(
                "{KEY_PREFIX}:{}:{}:{}",
                definition.id,
                definition.version,
                parameter_digest(parameters)
            ),
        }
    }

    /// Look up a cached envelope. Any problem is reported as a miss.
    pub async fn get(
        &self,
        definition: &QueryDefinition,
        parameters: &Map<String, Value>,
    ) -> Option<QueryResult> {
        let store = self.store.as_ref()?;
        let key = Self::key(definition, parameters);

        let raw = match self.bounded(store.get(&key)).await {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(%error, %key, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<QueryResult>(&raw) {
            Ok(mut result) => {
                result.metadata.cached = true;
                tracing::debug!(%key, "cache hit");
                Some(result)
            }
            Err(error) => {
                tracing::warn!(%error, %key, "cached entry could not be decoded; treating as miss");
                None
            }
        }
    }

    /// Store an envelope under the definition's TTL. Failures are logged.
    pub async fn set(
        &self,
        definition: &QueryDefinition,
        parameters: &Map<String, Value>,
        result: &QueryResult,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let key = Self::key(definition, parameters);

        let mut stored = result.clone();
        stored.metadata.cached = false;
        let encoded = match serde_json::to_string(&stored) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::warn!(%error, %key, "result could not be encoded for caching");
                return;
            }
        };

        let ttl = definition
            .cache
            .as_ref()
            .map(|c| c.ttl_seconds)
            .filter(|ttl| *ttl > 0)
            .map_or(self.default_ttl, Duration::from_secs);

        if let Err(error) = self.bounded(store.set_with_ttl(&key, &encoded, ttl)).await {
            tracing::warn!(%error, %key, "cache write failed");
        }
    }

    /// Delete entries for one definition, or every entry. Returns the count.
    pub async fn clear(&self, definition_id: Option<&str>) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let pattern = definition_id.map_or_else(
            || format!("{KEY_PREFIX}:*"),
            |id| format!("{KEY_PREFIX}:{id}:*"),
        );

        let keys = match self.bounded(store.keys(&pattern)).await {
            Ok(keys) => keys,
            Err(error) => {
                tracing::warn!(%error, %pattern, "cache key listing failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.bounded(store.delete(&keys)).await {
            Ok(deleted) => {
                tracing::info!(%pattern, deleted, "cache cleared");
                deleted
            }
            Err(error) => {
                tracing::warn!(%error, %pattern, "cache delete failed");
                0
            }
        }
    }

    /// Check that the store answers within the operation timeout.
    pub async fn ping(&self) -> bool {
        match &self.store {
            Some(store) => self.bounded(store.ping()).await.is_ok(),
            None => false,
        }
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(
                u64::try_from(self.op_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

/// First 8 hex digits of SHA-256 over the key-sorted canonical JSON.
#[must_use]
pub fn parameter_digest(parameters: &Map<String, Value>) -> String {
    let canonical = canonical_json(&Value::Object(parameters.clone()));
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")[..8].to_string()
}

/// Serialize with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}
