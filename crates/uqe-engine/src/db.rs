//! The engine's libSQL database handle and embedded migrations.

use libsql::Builder;
use uqe_config::DatabaseConfig;

use crate::error::StoreError;

/// Definitions, cache entries, and execution metrics tables.
const MIGRATION_001: &str = include_str!("../migrations/001_initial.sql");

/// Shared libSQL handle for the registry, the persistent cache store, the
/// metrics table, and the default relational backend.
///
/// Holds one long-lived connection for the engine's own bookkeeping. Relational
/// query execution opens a fresh connection per call via [`EngineDb::connect`].
pub struct EngineDb {
    db: libsql::Database,
    conn: libsql::Connection,
}

impl EngineDb {
    /// Open a local database file (or `":memory:"`) and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the database cannot be opened or migrated.
    pub async fn open_local(path: &str) -> Result<Self, StoreError> {
        let db = Builder::new_local(path).build().await?;
        Self::from_database(db).await
    }

    /// Open a remote libSQL database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the connection or migrations fail.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self, StoreError> {
        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await?;
        Self::from_database(db).await
    }

    /// Open whichever database `config` describes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the database cannot be opened or migrated.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if config.is_remote() {
            return Self::open_remote(&config.url, &config.auth_token).await;
        }
        if config.path != ":memory:" {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Migration(format!("create {}: {e}", parent.display()))
                    })?;
                }
            }
        }
        Self::open_local(&config.path).await
    }

    async fn from_database(db: libsql::Database) -> Result<Self, StoreError> {
        let conn = db.connect()?;
        let engine_db = Self { db, conn };
        engine_db.run_migrations().await?;
        Ok(engine_db)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(MIGRATION_001)
            .await
            .map_err(|e| StoreError::Migration(format!("001_initial: {e}")))?;
        Ok(())
    }

    /// The long-lived bookkeeping connection.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Open a new connection to the same database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LibSql` if the connection cannot be opened.
    pub fn connect(&self) -> Result<libsql::Connection, StoreError> {
        Ok(self.db.connect()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = EngineDb::open_local(":memory:").await.unwrap();
        for table in ["query_definitions", "cache_entries", "query_executions"] {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                )
                .await
                .unwrap();
            assert!(rows.next().await.unwrap().is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = EngineDb::open_local(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn open_from_config_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.db");
        let config = DatabaseConfig {
            path: path.to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };
        EngineDb::open(&config).await.unwrap();
        assert!(path.exists());
    }
}
