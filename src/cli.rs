//! CLI argument parsing for punchlist.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "punchlist",
    about = "A todo tracker with MCP tooling and issue tracker sync",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/punchlist/logs/punchlist.log"
)]
pub struct Cli {
    /// Path to the SQLite database (default: platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the config file (default: platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a new todo
    Add {
        /// Todo text; the first line becomes the title
        content: String,

        /// Priority (low, medium, high)
        #[arg(short, long)]
        priority: Option<String>,

        /// Tags (comma-separated)
        #[arg(short, long)]
        tags: Option<String>,

        /// Source file this todo refers to
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Line number within the source file
        #[arg(short, long, requires = "file")]
        line: Option<i64>,
    },

    /// List todos, open items first
    List {
        /// Filter by status (todo, in_progress, done)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a todo in full
    Get {
        /// Todo id
        id: i64,
    },

    /// Search todos by content substring
    Search {
        /// Substring to match against todo content
        query: String,

        /// Filter by priority (low, medium, high)
        #[arg(short, long)]
        priority: Option<String>,

        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Filter by source file path
        #[arg(long)]
        path: Option<String>,

        /// Only completed todos
        #[arg(long, conflicts_with = "open")]
        done: bool,

        /// Only open todos
        #[arg(long)]
        open: bool,
    },

    /// Show aggregate statistics
    Stats,

    /// Toggle a todo between done and not-done
    Done {
        /// Todo id
        id: i64,
    },

    /// Delete a todo
    Delete {
        /// Todo id
        id: i64,
    },

    /// Serve MCP tools over stdio
    Serve,

    /// Sync with external issue trackers
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
}

#[derive(Subcommand)]
pub enum SyncCommand {
    /// Create an external issue for a todo and link it
    Link {
        /// Todo id
        id: i64,

        /// Tracker to link to (github, linear, jira)
        integration: String,
    },

    /// Push a todo's status to every linked tracker
    Status {
        /// Todo id
        id: i64,
    },

    /// Create external issues for every unlinked todo
    Bulk {
        /// Tracker to create issues on (github, linear, jira)
        integration: String,

        /// Only todos with this priority (low, medium, high)
        #[arg(short, long)]
        priority: Option<String>,

        /// Only todos with this status (todo, in_progress, done)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Import issues from a tracker search as local todos
    Import {
        /// Tracker to import from (github, linear, jira)
        integration: String,

        /// Tracker-side search query
        query: String,
    },
}
