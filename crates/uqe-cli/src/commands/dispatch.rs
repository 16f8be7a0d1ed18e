use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Execute(args) => commands::execute::handle(&args, ctx, flags).await,
        Commands::Definition { action } => commands::definition::handle(&action, ctx, flags).await,
        Commands::Cache { action } => commands::cache::handle(&action, ctx, flags).await,
        Commands::Validate(_) | Commands::Build(_) | Commands::Schema(_) => {
            unreachable!("validate/build/schema are pre-dispatched in main")
        }
    }
}
