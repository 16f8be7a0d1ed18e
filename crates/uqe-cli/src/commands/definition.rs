use crate::cli::GlobalFlags;
use crate::cli::subcommands::DefinitionCommands;
use crate::context::AppContext;
use crate::input::read_json;
use crate::output::output;

/// Handle `uqe definition`.
pub async fn handle(
    action: &DefinitionCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let registry = &ctx.registry;
    match action {
        DefinitionCommands::Register { file } => {
            let stored = registry.register(&read_json(file)?).await?;
            output(&stored.to_value(), flags.format)
        }
        DefinitionCommands::Replace { file } => {
            let stored = registry.replace(&read_json(file)?).await?;
            output(&stored.to_value(), flags.format)
        }
        DefinitionCommands::Get { id } => output(&registry.get(id).await?.to_value(), flags.format),
        DefinitionCommands::List => {
            let limit = flags.limit.unwrap_or(usize::MAX);
            let summaries = registry
                .list()
                .await?
                .into_iter()
                .take(limit)
                .map(|definition| {
                    let data_source = definition.data_source();
                    serde_json::json!({
                        "id": definition.id,
                        "name": definition.name,
                        "version": definition.version,
                        "dataSource": data_source,
                    })
                })
                .collect::<Vec<_>>();
            output(&summaries, flags.format)
        }
        DefinitionCommands::Delete { id } => {
            registry.delete(id).await?;
            output(&serde_json::json!({ "id": id, "deleted": true }), flags.format)
        }
    }
}
