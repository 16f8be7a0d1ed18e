use std::sync::Arc;

use anyhow::Context;
use uqe_config::EngineConfig;
use uqe_engine::{DefinitionRegistry, EngineDb, QueryService};

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub service: QueryService,
    pub registry: DefinitionRegistry,
}

impl AppContext {
    /// Open the engine database and wire the service and registry.
    pub async fn init(config: EngineConfig) -> anyhow::Result<Self> {
        warn_unconfigured(&config);

        let db = Arc::new(
            EngineDb::open(&config.database)
                .await
                .context("failed to open the engine database")?,
        );
        let service = QueryService::from_config(&config, Arc::clone(&db))
            .await
            .context("failed to initialize the query service")?;
        let registry = DefinitionRegistry::new(db).with_cache(service.cache().clone());

        Ok(Self { service, registry })
    }
}

/// Emit warnings for settings that silently fell back to defaults.
fn warn_unconfigured(config: &EngineConfig) {
    for warning in collect_unconfigured_warnings(config, std::env::vars()) {
        tracing::warn!("{warning}");
    }
}

fn collect_unconfigured_warnings<I>(config: &EngineConfig, env: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env_keys = env.into_iter().map(|(key, _)| key).collect::<Vec<_>>();
    let mut warnings = Vec::new();

    if config.database.url.is_empty() != config.database.auth_token.is_empty() {
        warnings.push(
            "Remote database needs both database.url and database.auth_token; using the local file."
                .to_string(),
        );
    }

    for (section, example) in [
        ("DATABASE", "UQE_DATABASE__URL"),
        ("CACHE", "UQE_CACHE__BACKEND"),
        ("DIRECTORY", "UQE_DIRECTORY__BASE_DN"),
        ("LIMITS", "UQE_LIMITS__MAX_RESULTS_CAP"),
    ] {
        let single = format!("UQE_{section}_");
        let double = format!("UQE_{section}__");
        if env_keys
            .iter()
            .any(|key| key.starts_with(&single) && !key.starts_with(&double))
        {
            warnings.push(format!(
                "UQE_{section}_* env vars are ignored. Use double underscores (example: {example})."
            ));
        }
    }

    warnings
}
