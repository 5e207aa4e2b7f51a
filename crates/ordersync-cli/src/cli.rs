use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ordersync")]
#[command(about = "Replay sync batches and inspect conflict resolutions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a captured sync batch against the order store
    Sync {
        /// JSON file holding `{"orders": [...]}` or a bare array of orders
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
        /// Business the batch belongs to
        #[arg(short, long)]
        business: String,
        /// Actor recorded on audit entries
        #[arg(short, long, default_value = "ordersync-cli")]
        actor: String,
        /// Run against an empty in-memory store; nothing is written to disk
        #[arg(long)]
        dry_run: bool,
        /// Output the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the order of record for a client-generated id
    Show {
        /// Client-generated order id
        client_id: String,
        #[arg(short, long)]
        business: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List conflict resolutions recorded for an order, newest first
    Resolutions {
        /// Client-generated order id
        client_id: String,
        #[arg(short, long)]
        business: String,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize resolutions by action over a time window
    Stats {
        #[arg(short, long)]
        business: String,
        /// Window start (RFC 3339); defaults to 24 hours before the end
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Window end (RFC 3339); defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,
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
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
