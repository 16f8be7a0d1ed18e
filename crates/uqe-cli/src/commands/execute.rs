use anyhow::{Context, bail};
use uqe_core::{QueryContext, QueryDefinition};

use crate::cli::root_commands::ExecuteArgs;
use crate::cli::{GlobalFlags, OutputFormat};
use crate::context::AppContext;
use crate::input::{parameters, read_json};
use crate::output::output;

/// Handle `uqe execute`.
pub async fn handle(args: &ExecuteArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let definition = match (&args.id, &args.file) {
        (Some(id), _) => ctx.registry.get(id).await?,
        (None, Some(file)) => QueryDefinition::from_value(read_json(file)?)
            .with_context(|| format!("{} is not a query definition", file.display()))?,
        (None, None) => bail!("either a definition id or --file is required"),
    };

    let context = execution_context(args, flags)?;
    let result = ctx.service.execute_query(&definition, &context).await?;

    // Tables show the rows; the envelope only makes sense as JSON.
    if flags.format == OutputFormat::Table && result.success {
        output(&result.data, flags.format)?;
    } else {
        output(&result, flags.format)?;
    }

    if !result.success {
        bail!(
            "query '{}' failed: {}",
            definition.id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn execution_context(args: &ExecuteArgs, flags: &GlobalFlags) -> anyhow::Result<QueryContext> {
    Ok(QueryContext {
        user_id: args.user.clone(),
        parameters: parameters(&args.input)?,
        bypass_cache: args.no_cache,
        max_results: flags.limit,
        timeout_ms: args.timeout_ms,
        roles: args.roles.clone(),
        permissions: args.permissions.clone(),
        ..QueryContext::default()
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::cli::{Cli, Commands};

    #[test]
    fn context_carries_caller_and_overrides() {
        let cli = Cli::try_parse_from([
            "uqe",
            "--limit",
            "25",
            "execute",
            "users_by_dept",
            "--params",
            r#"{"department": "finance"}"#,
            "--user",
            "u-7",
            "--role",
            "auditor",
            "--permission",
            "read:users",
            "--no-cache",
            "--timeout-ms",
            "1500",
        ])
        .unwrap();
        let flags = cli.global_flags();
        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };

        let context = execution_context(&args, &flags).unwrap();
        assert_eq!(context.user_id.as_deref(), Some("u-7"));
        assert_eq!(serde_json::Value::Object(context.parameters), json!({"department": "finance"}));
        assert!(context.bypass_cache);
        assert_eq!(context.max_results, Some(25));
        assert_eq!(context.timeout_ms, Some(1500));
        assert_eq!(context.roles, vec!["auditor".to_string()]);
        assert_eq!(context.permissions, vec!["read:users".to_string()]);
    }
}
