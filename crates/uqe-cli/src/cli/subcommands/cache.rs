use clap::Subcommand;

/// Result cache management.
#[derive(Clone, Debug, Subcommand)]
pub enum CacheCommands {
    /// Delete cached results for one definition, or all of them.
    Clear {
        /// Definition id (if omitted, clear every cached result)
        id: Option<String>,
    },
    /// Check that the configured cache store responds.
    Ping,
}
