use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer failed to parse or did not match `EngineConfig`.
    #[error("failed to load uqe configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("{field} is invalid: {reason}")]
    InvalidValue { field: String, reason: String },
}
