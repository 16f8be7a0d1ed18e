//! Key-value stores behind the result cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::EngineDb;
use crate::error::StoreError;

/// Longest TTL a store honours; longer requests are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Every this many writes, a store drops its expired entries.
pub const SWEEP_EVERY: u64 = 64;

fn sweep_due(writes: &AtomicU64) -> bool {
    (writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0
}

/// A string key-value store with per-entry TTLs and glob-style key listing.
///
/// Patterns use `*` for any run of characters and `?` for one character.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Match `key` against a glob with `*` and `?` wildcards.
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, k));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            k = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

/// Process-local expiring map. Expired entries are dropped on access and
/// swept periodically on write.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    writes: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires)) if *expires > now => return Ok(Some(value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires = now + ttl.min(MAX_TTL);
        let mut entries = self.entries.write().await;
        if sweep_due(&self.writes) {
            entries.retain(|_, (_, until)| *until > now);
        }
        entries.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// libSQL store
// ---------------------------------------------------------------------------

/// Cache entries in the `cache_entries` table, shared across processes that
/// open the same database.
pub struct LibsqlStore {
    db: Arc<EngineDb>,
    writes: AtomicU64,
}

impl LibsqlStore {
    #[must_use]
    pub const fn new(db: Arc<EngineDb>) -> Self {
        Self {
            db,
            writes: AtomicU64::new(0),
        }
    }

    /// Remove every expired entry. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LibSql` if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .db
            .conn()
            .execute("DELETE FROM cache_entries WHERE expires_at <= ?1", [now])
            .await?)
    }
}

#[async_trait]
impl CacheStore for LibsqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                libsql::params![key, now],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        self.db
            .conn()
            .execute(
                "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                libsql::params![key, value, expires_at],
            )
            .await?;
        if sweep_due(&self.writes) {
            match self.purge_expired().await {
                Ok(purged) => tracing::debug!(purged, "expired cache entries purged"),
                Err(error) => tracing::warn!(%error, "cache purge failed"),
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for key in keys {
            let changed = self
                .db
                .conn()
                .execute("DELETE FROM cache_entries WHERE key = ?1", [key.as_str()])
                .await?;
            if changed > 0 {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT key FROM cache_entries WHERE key GLOB ?1 AND expires_at > ?2 ORDER BY key",
                libsql::params![pattern, now],
            )
            .await?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get::<String>(0)?);
        }
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut rows = self.db.conn().query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }
}
