use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plait")]
#[command(about = "Merge and sync AI chat history captured from every platform")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest capture files produced by the platform extensions
    Ingest {
        /// Capture files to read ("-" reads stdin)
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,
        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent conversations
    List {
        /// Number of conversations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Filter by source platform
        #[arg(long)]
        platform: Option<String>,
        /// Show only favorites
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one conversation with its transcript
    Show {
        /// Conversation ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a conversation as favorite
    Favorite {
        /// Conversation ID or unique ID prefix
        id: String,
        /// Clear the favorite flag instead
        #[arg(long)]
        remove: bool,
    },
    /// Delete a conversation
    Delete {
        /// Conversation ID or unique ID prefix
        id: String,
    },
    /// Run one sync pass against the configured remote
    Sync,
    /// List merge conflicts waiting for a decision
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a parked merge conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Which version wins
        #[arg(value_enum)]
        choice: ResolveChoice,
    },
    /// Show archive counters and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolveChoice {
    /// Keep the local version
    Local,
    /// Adopt the remote version
    Remote,
    /// Re-merge with last-writer-wins
    Merged,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
