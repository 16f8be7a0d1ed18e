use schemars::schema_for;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{SchemaArgs, SchemaType};
use crate::output::output;

/// Handle `uqe schema`.
pub fn handle(args: &SchemaArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    output(&schema_value(args.type_name)?, flags.format)
}

fn schema_value(type_name: SchemaType) -> anyhow::Result<serde_json::Value> {
    let schema = match type_name {
        SchemaType::Definition => schema_for!(uqe_core::DefinitionDocument),
        SchemaType::Result => schema_for!(uqe_core::QueryResult),
        SchemaType::Context => schema_for!(uqe_core::QueryContext),
    };
    Ok(serde_json::to_value(schema)?)
}
