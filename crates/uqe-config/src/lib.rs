//! # uqe-config
//!
//! Layered configuration loading for the unified query engine using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`UQE_*` prefix, `__` as separator)
//! 2. Project-level `.uqe/config.toml`
//! 3. User-level `~/.config/uqe/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `UQE_CACHE__BACKEND` -> `cache.backend`,
//! `UQE_DIRECTORY__BASE_DN` -> `directory.base_dn`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use uqe_config::EngineConfig;
//!
//! let config = EngineConfig::load_with_dotenv().expect("config");
//! if config.cache.is_active() {
//!     println!("cache timeout: {} ms", config.cache.op_timeout_ms);
//! }
//! ```

mod cache;
mod database;
mod directory;
mod error;
mod limits;

pub use cache::{CacheBackend, CacheConfig};
pub use database::DatabaseConfig;
pub use directory::DirectoryConfig;
pub use error::ConfigError;
pub use limits::{LimitsConfig, TransformConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub transforms: TransformConfig,
}

impl EngineConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is out of range.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Extract and check a config from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is out of range.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests and the CLI can add providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".uqe/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("UQE_").split("__"))
    }

    /// Reject values that would make the engine misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_results_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_results_cap".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.cache.is_active() && self.cache.op_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.op_timeout_ms".into(),
                reason: "must be positive when the cache is enabled".into(),
            });
        }
        if self.transforms.max_password_age_days <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "transforms.max_password_age_days".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("uqe").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cache.is_active());
        assert!(!config.directory.is_configured());
        assert_eq!(config.limits.max_results_cap, 10_000);
    }

    #[test]
    fn figment_builds_without_files() {
        let config: EngineConfig = EngineConfig::figment()
            .extract()
            .expect("should extract defaults");
        assert_eq!(config.cache.default_ttl_secs, 300);
    }

    #[test]
    fn zero_result_cap_is_rejected() {
        let mut config = EngineConfig::default();
        config.limits.max_results_cap = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.max_results_cap"));
    }
}
