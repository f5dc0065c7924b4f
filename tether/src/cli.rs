//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tether operator CLI
///
/// Manages the voice template registry, inspects companion mappings and
/// drives the tether-server daemon.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Mapping store path (defaults to $TETHER_DIR/tether.db)
    #[arg(long, global = true, env = "TETHER_DATABASE")]
    pub database: Option<PathBuf>,

    /// Daemon base URL
    #[arg(long, global = true, env = "TETHER_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Voice template registry (base channels that spawn rooms)
    Templates(TemplatesCommand),

    /// Inspect template → companion mappings
    Mappings(MappingsCommand),

    /// Ask the daemon to run a reconciliation pass now
    Sweep {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Ask the daemon to reclaim a template's companion if it is empty
    Reclaim {
        /// Template ID
        template_id: String,
    },

    /// Show daemon and store status
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Template Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TemplatesCommand {
    #[command(subcommand)]
    pub action: TemplatesAction,
}

#[derive(Subcommand, Debug)]
pub enum TemplatesAction {
    /// Register a base voice channel
    Add {
        /// Channel ID
        id: String,
        /// Display name; rooms are named "<name> #<n>"
        name: String,
        /// Category the rooms are placed in
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// List registered templates
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Unregister a template
    Remove {
        /// Channel ID
        id: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Mapping Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MappingsCommand {
    #[command(subcommand)]
    pub action: MappingsAction,
}

#[derive(Subcommand, Debug)]
pub enum MappingsAction {
    /// List active mappings (or the archive)
    List {
        /// Show locked companions instead
        #[arg(short, long)]
        archived: bool,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the mapping of one template
    Show {
        /// Template ID
        template_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_templates_add() {
        let cli = Cli::try_parse_from([
            "tether", "templates", "add", "123", "Lounge", "--parent", "cat-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Templates(TemplatesCommand {
                action: TemplatesAction::Add { id, name, parent },
            }) => {
                assert_eq!(id, "123");
                assert_eq!(name, "Lounge");
                assert_eq!(parent.as_deref(), Some("cat-1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tether",
            "mappings",
            "list",
            "--archived",
            "--database",
            "/tmp/t.db",
        ])
        .unwrap();

        assert_eq!(cli.database, Some(PathBuf::from("/tmp/t.db")));
        assert!(matches!(
            cli.command,
            Commands::Mappings(MappingsCommand {
                action: MappingsAction::List { archived: true, .. }
            })
        ));
    }
}
