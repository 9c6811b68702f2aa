//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tracksync - bidirectional sync between local work items and remote trackers
#[derive(Parser, Debug)]
#[command(name = "tsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Home directory (default: ~/.tracksync)
    #[arg(long, global = true, env = "TRACKSYNC_HOME")]
    pub home: Option<PathBuf>,

    /// Remote provider (github, azure_devops). Overrides config and environment
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Plan the operation without calling the remote or writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage local work items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },

    /// Push local items to the remote tracker
    Push(BatchTargetArgs),

    /// Pull remote items into the local store
    Pull(BatchTargetArgs),

    /// Two-way sync with conflict detection
    Sync(SyncArgs),

    /// Show sync state of local items
    Status {
        /// Local item ids (default: all)
        ids: Vec<String>,
    },

    /// Post a comment on the remote copy of a local item
    Comment {
        /// Local item id
        id: String,

        /// Comment text
        text: String,
    },

    /// Check credentials against the remote tracker
    Auth,

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Item Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ItemCommands {
    /// Create a local work item
    Add(ItemAddArgs),

    /// List local work items
    List(ItemListArgs),

    /// Show one local work item and its sync record
    Show {
        /// Local item id
        id: String,
    },

    /// Change fields of a local work item
    Update(ItemUpdateArgs),
}

#[derive(Args, Debug)]
pub struct ItemAddArgs {
    /// Item title
    pub title: String,

    /// Kind (feature, epic, task)
    #[arg(short, long, default_value = "task")]
    pub kind: String,

    /// Status (backlog, open, in_progress, blocked, closed, deferred)
    #[arg(short, long, default_value = "open")]
    pub status: String,

    /// Description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ItemListArgs {
    /// Filter by status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by kind
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Maximum items to return
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ItemUpdateArgs {
    /// Local item id
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub kind: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Replace labels (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
}

// ============================================================================
// Sync Commands
// ============================================================================

/// Item selection plus batch tuning shared by push, pull and sync.
#[derive(Args, Debug)]
pub struct BatchTargetArgs {
    /// Item ids (local ids for push/sync, remote ids for pull)
    #[arg(required_unless_present = "all")]
    pub ids: Vec<String>,

    /// Select every item
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    #[command(flatten)]
    pub batch: BatchFlags,
}

#[derive(Args, Debug, Default)]
pub struct BatchFlags {
    /// Maximum concurrent remote operations
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Retries for transient failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Suspend when fewer remote requests than this remain
    #[arg(long)]
    pub threshold: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: BatchTargetArgs,

    /// Conflict strategy (local, remote, newest, manual, merge)
    #[arg(long)]
    pub strategy: Option<String>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (tokens redacted)
    Show,

    /// Set a configuration key (e.g. github.owner, batch.maxConcurrent)
    Set {
        key: String,
        value: String,
    },

    /// Print the config file path
    Path,
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
    fn test_push_requires_ids_or_all() {
        assert!(Cli::try_parse_from(["tsync", "push"]).is_err());
        assert!(Cli::try_parse_from(["tsync", "push", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["tsync", "push", "wi_1", "--all"]).is_err());
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::try_parse_from([
            "tsync",
            "--dry-run",
            "sync",
            "--all",
            "--strategy",
            "newest",
            "--max-concurrent",
            "4",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.target.all);
        assert_eq!(args.strategy.as_deref(), Some("newest"));
        assert_eq!(args.target.batch.max_concurrent, Some(4));
    }

    #[test]
    fn test_item_add_labels_split_on_comma() {
        let cli = Cli::try_parse_from(["tsync", "item", "add", "Fix login", "-l", "auth,bug"]).unwrap();
        let Commands::Item {
            command: ItemCommands::Add(args),
        } = cli.command
        else {
            panic!("expected item add");
        };
        assert_eq!(args.labels, vec!["auth", "bug"]);
        assert_eq!(args.kind, "task");
    }
}
