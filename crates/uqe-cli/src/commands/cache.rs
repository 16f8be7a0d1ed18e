use anyhow::bail;
use serde_json::json;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::CacheCommands;
use crate::context::AppContext;
use crate::output::output;

/// Handle `uqe cache`.
pub async fn handle(action: &CacheCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let cache = ctx.service.cache();
    match action {
        CacheCommands::Clear { id } => {
            let deleted = cache.clear(id.as_deref()).await;
            output(&json!({ "id": id, "deleted": deleted }), flags.format)
        }
        CacheCommands::Ping => {
            if !cache.is_available() {
                bail!("result cache is disabled (set cache.enabled = true)");
            }
            let healthy = cache.ping().await;
            output(&json!({ "healthy": healthy }), flags.format)?;
            if !healthy {
                bail!("cache store did not respond");
            }
            Ok(())
        }
    }
}
