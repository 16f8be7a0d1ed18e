use std::path::PathBuf;

use clap::Subcommand;

/// Registered query definitions.
#[derive(Clone, Debug, Subcommand)]
pub enum DefinitionCommands {
    /// Validate and store a new definition.
    Register {
        /// Definition document (JSON)
        file: PathBuf,
    },
    /// Replace an existing definition with a complete new document.
    Replace {
        /// Definition document (JSON)
        file: PathBuf,
    },
    /// Show one definition.
    Get {
        /// Definition id
        id: String,
    },
    /// List definitions.
    List,
    /// Delete a definition and its cached results.
    Delete {
        /// Definition id
        id: String,
    },
}
