//! Cross-cutting error types for the query engine.
//!
//! `CoreError` covers problems with the model itself (malformed definition
//! documents, missing entities). `QueryError` is the execution taxonomy shared
//! by the engine and its callers. Crate-specific errors (`ConfigError`,
//! `RegistryError`) live in their own crates.

use thiserror::Error;

/// Errors raised while loading or manipulating model types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// Data failed validation (shape, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors produced while validating, preparing, or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The definition or parameters failed pre-execution validation.
    #[error("Query validation failed: {}", errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    /// A parameter could not be coerced or violated its declared rules.
    #[error("Invalid parameter '{name}': {reason}")]
    Parameter { name: String, reason: String },

    /// The SQL builder rejected its input.
    #[error("Query build failed: {0}")]
    Build(String),

    /// The backend could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The execution identity was missing or rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The statement or backend call exceeded its time bound.
    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    /// The result mapping itself was malformed.
    #[error("Result transform failed: {0}")]
    Transform(String),

    /// A required collaborator or setting is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Anything else that went wrong during execution.
    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QueryError {
    /// Shorthand for a parameter failure.
    pub fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller caused this error (maps to a 400-class response).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Parameter { .. } | Self::Build(_)
        )
    }

    /// Stable short name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Parameter { .. } => "parameter",
            Self::Build(_) => "build",
            Self::Connection(_) => "connection",
            Self::Authentication(_) => "authentication",
            Self::Timeout(_) => "timeout",
            Self::Transform(_) => "transform",
            Self::Configuration(_) => "configuration",
            Self::Execution(_) | Self::Other(_) => "execution",
        }
    }
}

impl From<CoreError> for QueryError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(message) => Self::Validation {
                errors: vec![message],
                warnings: Vec::new(),
            },
            other => Self::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_all_errors() {
        let error = QueryError::Validation {
            errors: vec!["missing id".into(), "bad ttl".into()],
            warnings: vec![],
        };
        assert_eq!(
            error.to_string(),
            "Query validation failed: missing id; bad ttl"
        );
        assert!(error.is_client_error());
    }

    #[test]
    fn execution_errors_are_not_client_errors() {
        assert!(!QueryError::Timeout(500).is_client_error());
        assert!(!QueryError::Connection("refused".into()).is_client_error());
        assert_eq!(QueryError::Timeout(500).kind(), "timeout");
    }

    #[test]
    fn parameter_helper_names_the_parameter() {
        let error = QueryError::parameter("days", "must be at least 1");
        assert_eq!(error.to_string(), "Invalid parameter 'days': must be at least 1");
    }
}
