//! Definition registry: create, full replacement, lookup, and deletion of
//! query definitions stored in the engine database.
//!
//! Documents are validated before they are stored and are always written in
//! the normalized document shape. Rows written by older deployments, where
//! non-relational configs sit as JSON text in the `query` slot, still load.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uqe_core::QueryDefinition;

use crate::cache::QueryCache;
use crate::db::EngineDb;
use crate::error::{RegistryError, StoreError};
use crate::validator::QueryValidator;

pub struct DefinitionRegistry {
    db: Arc<EngineDb>,
    validator: QueryValidator,
    cache: Option<QueryCache>,
}

impl DefinitionRegistry {
    #[must_use]
    pub const fn new(db: Arc<EngineDb>) -> Self {
        Self {
            db,
            validator: QueryValidator::new(),
            cache: None,
        }
    }

    /// Clear a definition's cached results whenever it is replaced or deleted.
    #[must_use]
    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate and store a new definition.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` for a bad document,
    /// `RegistryError::Duplicate` if the id is taken (including by a
    /// concurrent registration), or a store error.
    pub async fn register(&self, document: &Value) -> Result<QueryDefinition, RegistryError> {
        let definition = self.checked(document)?;
        let now = Utc::now().to_rfc3339();
        let stored = serde_json::to_string(&definition.to_value()).map_err(StoreError::from)?;
        self.db
            .conn()
            .execute(
                "INSERT INTO query_definitions
                    (id, name, version, data_source, document, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    definition.id.as_str(),
                    definition.name.as_str(),
                    definition.version.as_str(),
                    definition.data_source().as_str(),
                    stored,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    RegistryError::Duplicate(definition.id.clone())
                } else {
                    error.into()
                }
            })?;

        tracing::info!(query_id = %definition.id, "query definition registered");
        Ok(definition)
    }

    /// Replace an existing definition with a complete new document.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` for a bad document,
    /// `RegistryError::NotFound` if the id is unknown, or a store error.
    pub async fn replace(&self, document: &Value) -> Result<QueryDefinition, RegistryError> {
        let definition = self.checked(document)?;
        let stored = serde_json::to_string(&definition.to_value()).map_err(StoreError::from)?;
        let changed = self
            .db
            .conn()
            .execute(
                "UPDATE query_definitions
                 SET name = ?2, version = ?3, data_source = ?4, document = ?5, updated_at = ?6
                 WHERE id = ?1",
                libsql::params![
                    definition.id.as_str(),
                    definition.name.as_str(),
                    definition.version.as_str(),
                    definition.data_source().as_str(),
                    stored,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        if changed == 0 {
            return Err(RegistryError::NotFound(definition.id));
        }

        self.invalidate(&definition.id).await;
        tracing::info!(query_id = %definition.id, "query definition replaced");
        Ok(definition)
    }

    /// Load one definition.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the id is unknown, or a store
    /// error if the stored document no longer parses.
    pub async fn get(&self, id: &str) -> Result<QueryDefinition, RegistryError> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT document FROM query_definitions WHERE id = ?1", [id])
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        decode(id, &row.get::<String>(0)?)
    }

    /// Every stored definition, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the table cannot be read or a row is corrupt.
    pub async fn list(&self) -> Result<Vec<QueryDefinition>, RegistryError> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT id, document FROM query_definitions ORDER BY id", ())
            .await?;
        let mut definitions = Vec::new();
        while let Some(row) = rows.next().await? {
            let id = row.get::<String>(0)?;
            definitions.push(decode(&id, &row.get::<String>(1)?)?);
        }
        Ok(definitions)
    }

    /// Remove a definition and its cached results.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the id is unknown.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let changed = self
            .db
            .conn()
            .execute("DELETE FROM query_definitions WHERE id = ?1", [id])
            .await?;
        if changed == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.invalidate(id).await;
        tracing::info!(query_id = %id, "query definition deleted");
        Ok(())
    }

    fn checked(&self, document: &Value) -> Result<QueryDefinition, RegistryError> {
        let report = self.validator.validate_document(document);
        if !report.valid {
            return Err(RegistryError::Invalid {
                errors: report.errors,
                warnings: report.warnings,
            });
        }
        for warning in &report.warnings {
            tracing::warn!(%warning, "query definition warning");
        }
        QueryDefinition::from_value(document.clone()).map_err(|e| RegistryError::Invalid {
            errors: vec![e.to_string()],
            warnings: report.warnings,
        })
    }

    async fn invalidate(&self, id: &str) {
        if let Some(cache) = &self.cache {
            let cleared = cache.clear(Some(id)).await;
            tracing::debug!(query_id = %id, cleared, "cleared cached results");
        }
    }
}

/// The id is the primary key, so a taken id surfaces as a constraint failure.
fn is_unique_violation(error: &libsql::Error) -> bool {
    error.to_string().contains("UNIQUE constraint failed")
}

fn decode(id: &str, stored: &str) -> Result<QueryDefinition, RegistryError> {
    QueryDefinition::from_json(stored)
        .map_err(|e| StoreError::Codec(format!("stored definition '{id}': {e}")).into())
}
