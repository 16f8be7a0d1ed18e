use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::cli::subcommands::{CacheCommands, DefinitionCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Validate a definition file against a parameter bag.
    Validate(ValidateArgs),
    /// Execute a registered definition or a definition file.
    Execute(ExecuteArgs),
    /// Build a parameterized SELECT from a JSON builder spec.
    Build(BuildArgs),
    /// Manage registered query definitions.
    Definition {
        #[command(subcommand)]
        action: DefinitionCommands,
    },
    /// Result cache management.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Print a JSON schema.
    Schema(SchemaArgs),
}

/// Parameter bag sources, merged with `--param` winning over `--params`.
#[derive(Clone, Debug, Default, Args)]
pub struct ParamInput {
    /// Parameters as one JSON object
    #[arg(long)]
    pub params: Option<String>,

    /// A single parameter as key=value (value parsed as JSON when possible)
    #[arg(short = 'P', long)]
    pub param: Vec<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ValidateArgs {
    /// Definition document (JSON)
    pub file: PathBuf,

    #[command(flatten)]
    pub input: ParamInput,
}

#[derive(Clone, Debug, Args)]
pub struct ExecuteArgs {
    /// Registered definition id
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub id: Option<String>,

    /// Execute an unregistered definition document instead
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub input: ParamInput,

    /// Caller user id
    #[arg(long)]
    pub user: Option<String>,

    /// Caller role (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,

    /// Caller permission (repeatable)
    #[arg(long = "permission")]
    pub permissions: Vec<String>,

    /// Skip the cache read (results are still written through)
    #[arg(long)]
    pub no_cache: bool,

    /// Statement timeout override in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Args)]
pub struct BuildArgs {
    /// Builder spec (JSON)
    pub file: PathBuf,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SchemaType {
    /// Query definition document
    Definition,
    /// Query result envelope
    Result,
    /// Execution context
    Context,
}

#[derive(Clone, Debug, Args)]
pub struct SchemaArgs {
    /// Which schema to print
    #[arg(value_enum)]
    pub type_name: SchemaType,
}
