use anyhow::Context;
use figment::providers::{Env, Format, Toml};
use uqe_config::EngineConfig;

use crate::cli::GlobalFlags;

/// Load `.env`, the layered config, and any `--config` file.
///
/// A `--config` file sits above the user and project files but below
/// `UQE_*` environment variables.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<EngineConfig> {
    if let Err(error) = dotenvy::dotenv() {
        tracing::debug!(%error, "no .env file loaded");
    }

    let mut figment = EngineConfig::figment();
    if let Some(path) = &flags.config {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        figment = figment
            .merge(Toml::file(path))
            .merge(Env::prefixed("UQE_").split("__"));
    }

    let config = EngineConfig::from_figment(figment).context("failed to load configuration")?;
    tracing::debug!(
        database = %config.database.path,
        remote = config.database.is_remote(),
        cache = config.cache.is_active(),
        "configuration loaded"
    );
    Ok(config)
}
