//! Storage error types for uqe-engine.
//!
//! Execution failures use `uqe_core::QueryError`; these cover the libSQL
//! backed stores (definition registry, cache store, metrics table).

use thiserror::Error;

/// Errors from the engine database and the stores built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A store operation exceeded its time bound.
    #[error("Store operation timed out after {0} ms")]
    Timeout(u64),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string())
    }
}

/// Errors from the definition registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A definition with this id is already registered.
    #[error("Query definition '{0}' already exists")]
    Duplicate(String),

    /// No definition with this id is registered.
    #[error("Query definition '{0}' not found")]
    NotFound(String),

    /// The document failed validation.
    #[error("Invalid query definition: {}", errors.join("; "))]
    Invalid {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<libsql::Error> for RegistryError {
    fn from(error: libsql::Error) -> Self {
        Self::Store(StoreError::LibSql(error))
    }
}
