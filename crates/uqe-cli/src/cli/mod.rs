use std::path::PathBuf;

use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `uqe` binary.
#[derive(Debug, Parser)]
#[command(name = "uqe", version, about = "Unified query engine - validate, build, and run query definitions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<usize>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Extra TOML config file, merged over the user and project files
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            quiet: self.quiet,
            verbose: self.verbose,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::subcommands::{CacheCommands, DefinitionCommands};
    use super::{Cli, Commands, GlobalFlags, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "uqe",
            "--format",
            "table",
            "--limit",
            "10",
            "--verbose",
            "definition",
            "list",
        ])
        .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.limit, Some(10));
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Definition {
                action: DefinitionCommands::List
            }
        ));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["uqe", "cache", "clear", "--format", "raw", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheCommands::Clear { id: None }
            }
        ));
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        let parsed = Cli::try_parse_from(["uqe", "--format", "xml", "definition", "list"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn execute_accepts_repeated_params() {
        let cli = Cli::try_parse_from([
            "uqe",
            "execute",
            "users_by_id",
            "-P",
            "id=7",
            "-P",
            "active=true",
            "--user",
            "u-1",
            "--no-cache",
        ])
        .expect("cli should parse");

        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        assert_eq!(args.id.as_deref(), Some("users_by_id"));
        assert_eq!(args.input.param, vec!["id=7".to_string(), "active=true".to_string()]);
        assert_eq!(args.user.as_deref(), Some("u-1"));
        assert!(args.no_cache);
    }

    #[test]
    fn execute_id_and_file_conflict() {
        let parsed =
            Cli::try_parse_from(["uqe", "execute", "users_by_id", "--file", "def.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_extraction_copies_values() {
        let cli = Cli::try_parse_from(["uqe", "--config", "/tmp/uqe.toml", "schema", "definition"])
            .expect("cli should parse");
        let flags: GlobalFlags = cli.global_flags();
        assert_eq!(
            flags.config.as_deref(),
            Some(std::path::Path::new("/tmp/uqe.toml"))
        );
    }
}
